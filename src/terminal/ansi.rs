use std::io::{self, Write};

pub const ESC: u8 = 0x1b;
pub const MAX_SEQUENCE_LEN: usize = 16;
pub const MAX_STYLES: usize = 8;

/// Final bytes the child may use: cursor forward/back, horizontal position,
/// erase in line and device status report.
const FORWARDED_FINALS: [u8; 5] = [b'C', b'D', b'G', b'K', b'n'];
const SGR_FINAL: u8 = b'm';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Normal,
    SawEscape,
    CollectingCsi,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Filtered<'a> {
    Pass(u8),
    Swallow,
    Verbatim(&'a [u8]),
}

/// SGR codes currently in effect, in activation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleSet {
    codes: Vec<u16>,
}

impl StyleSet {
    pub fn new() -> Self {
        Self {
            codes: Vec::with_capacity(MAX_STYLES),
        }
    }

    pub fn apply(&mut self, code: u16) {
        if code == 0 {
            self.codes.clear();
        } else if self.codes.len() < MAX_STYLES {
            self.codes.push(code);
        }
    }

    pub fn codes(&self) -> &[u16] {
        &self.codes
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for code in &self.codes {
            write!(out, "\x1b[{code}m")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AnsiFilter {
    state: ParseState,
    sequence: Vec<u8>,
    styles: StyleSet,
}

impl Default for AnsiFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl AnsiFilter {
    pub fn new() -> Self {
        Self {
            state: ParseState::Normal,
            sequence: Vec::with_capacity(MAX_SEQUENCE_LEN),
            styles: StyleSet::new(),
        }
    }

    pub fn styles(&self) -> &StyleSet {
        &self.styles
    }

    pub fn in_sequence(&self) -> bool {
        self.state != ParseState::Normal
    }

    pub fn feed(&mut self, byte: u8) -> Filtered<'_> {
        match self.state {
            ParseState::Normal => {
                if byte == ESC {
                    self.sequence.clear();
                    self.sequence.push(byte);
                    self.state = ParseState::SawEscape;
                    Filtered::Swallow
                } else {
                    Filtered::Pass(byte)
                }
            }
            ParseState::SawEscape => {
                if byte == b'[' {
                    self.sequence.push(byte);
                    self.state = ParseState::CollectingCsi;
                    Filtered::Swallow
                } else {
                    // Not a CSI sequence: drop the escape and treat the byte as ordinary.
                    self.reset();
                    self.feed(byte)
                }
            }
            ParseState::CollectingCsi => {
                if byte == ESC {
                    // A new escape abandons the unfinished sequence.
                    self.sequence.clear();
                    self.sequence.push(byte);
                    self.state = ParseState::SawEscape;
                    return Filtered::Swallow;
                }
                if !(0x20..=0x7e).contains(&byte) {
                    self.reset();
                    return self.feed(byte);
                }
                if self.sequence.len() >= MAX_SEQUENCE_LEN {
                    self.reset();
                    return Filtered::Swallow;
                }
                self.sequence.push(byte);
                if !byte.is_ascii_alphabetic() {
                    return Filtered::Swallow;
                }
                self.state = ParseState::Normal;
                if byte == SGR_FINAL {
                    if let Some(code) = leading_parameter(&self.sequence) {
                        self.styles.apply(code);
                    }
                    Filtered::Verbatim(&self.sequence)
                } else if FORWARDED_FINALS.contains(&byte) {
                    Filtered::Verbatim(&self.sequence)
                } else {
                    self.sequence.clear();
                    Filtered::Swallow
                }
            }
        }
    }

    fn reset(&mut self) {
        self.sequence.clear();
        self.state = ParseState::Normal;
    }
}

/// First numeric parameter of `ESC [ params final`. An empty parameter list
/// means 0; anything that does not start with a digit yields `None`.
fn leading_parameter(sequence: &[u8]) -> Option<u16> {
    let params = sequence.get(2..sequence.len().saturating_sub(1))?;
    let digits = params
        .iter()
        .take_while(|byte| byte.is_ascii_digit())
        .count();
    if digits == 0 {
        return if params.is_empty() || params[0] == b';' {
            Some(0)
        } else {
            None
        };
    }
    std::str::from_utf8(&params[..digits]).ok()?.parse().ok()
}
