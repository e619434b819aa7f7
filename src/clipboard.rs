//! Clipboard writes through the terminal (OSC 52), so copying works over SSH.

use anyhow::{Context, Result, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::io::Write;

/// Typical terminal limit on the base64 payload.
const MAX_PAYLOAD: usize = 74_994;

/// Build the OSC 52 sequence that sets the system clipboard to `text`.
/// Inside tmux the sequence is wrapped in a DCS passthrough.
pub fn osc52_sequence(text: &str, in_tmux: bool) -> Result<String> {
  let payload = STANDARD.encode(text.as_bytes());
  if payload.len() > MAX_PAYLOAD {
    bail!("Text is too large to copy ({} bytes)", text.len());
  }
  let seq = format!("\x1b]52;c;{}\x07", payload);
  if in_tmux { Ok(format!("\x1bPtmux;{}\x1b\\", seq.replace('\x1b', "\x1b\x1b"))) } else { Ok(seq) }
}

/// Copy `text` by writing the escape sequence to `out`.
pub fn copy_to(text: &str, out: &mut impl Write) -> Result<()> {
  let seq = osc52_sequence(text, std::env::var_os("TMUX").is_some())?;
  out.write_all(seq.as_bytes()).context("Failed to write clipboard sequence")?;
  out.flush().context("Failed to flush clipboard sequence")
}

pub fn copy(text: &str) -> Result<()> {
  copy_to(text, &mut std::io::stdout())
}
