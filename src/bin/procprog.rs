use std::io::IsTerminal;

use procprog::config::Config;
use procprog::logging::init_debug_log;
use procprog::ui::{
    resolve_color_enabled, MessageBlock, NoticeLevel, OutputMode, PlainRenderer, Renderer,
};
use procprog::{parse_command, print_usage, render_help, render_version, session, Command};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let output_mode = OutputMode::from_env();
    let cmd = match parse_command(args) {
        Ok(cmd) => cmd,
        Err(err) => {
            let mut renderer = PlainRenderer::stderr(output_mode);
            let _ = renderer.error_block(
                &MessageBlock::new("Invalid command arguments", err.to_string())
                    .with_hint("Run `procprog --help` to see supported options"),
            );
            print_usage();
            std::process::exit(2);
        }
    };

    let run = match cmd {
        Command::Help => {
            print!("{}", render_help());
            return;
        }
        Command::Version => {
            print!("{}", render_version());
            return;
        }
        Command::Run(run) => run,
    };

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            let mut renderer = PlainRenderer::stderr(output_mode);
            let _ = renderer.error_block(
                &MessageBlock::new("Invalid configuration", err.to_string())
                    .with_hint("Fix or remove the file, or point PROCPROG_CONFIG elsewhere"),
            );
            std::process::exit(1);
        }
    };

    if run.debug {
        let mut renderer = PlainRenderer::stderr(output_mode);
        let _ = match init_debug_log(&run.spec.display_name()) {
            Ok(path) => renderer.notice(
                NoticeLevel::Info,
                &format!("debug log: {}", path.display()),
            ),
            Err(err) => renderer.warning_block(&MessageBlock::new(
                "Debug log unavailable",
                err.to_string(),
            )),
        };
    }

    let color = resolve_color_enabled(output_mode, std::io::stdout().is_terminal());
    let options = run.run_options(color);
    match session::run(&options, &config) {
        Ok(outcome) => {
            let mut renderer = PlainRenderer::stdout(output_mode);
            let _ = if run.json {
                renderer.text(&outcome.to_json().to_string())
            } else {
                renderer.report(&outcome.report())
            };
            std::process::exit(outcome.exit_code());
        }
        Err(err) => {
            let mut renderer = PlainRenderer::stderr(output_mode);
            let _ = renderer.error_block(&MessageBlock::new("Run failed", err.to_string()));
            std::process::exit(1);
        }
    }
}
