use anyhow::Result;
use arboard::Clipboard;

/// Plain-text clipboard write. Implementations never read back.
pub trait ClipboardSink: Send + Sync {
    fn set_text(&self, text: &str) -> Result<()>;
}

/// The host platform clipboard. A handle is opened per write, since a
/// headless host may have no clipboard at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl ClipboardSink for SystemClipboard {
    fn set_text(&self, text: &str) -> Result<()> {
        let mut clipboard = Clipboard::new()?;
        clipboard.set_text(text.to_string())?;
        Ok(())
    }
}

/// Accepts every write and discards it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopClipboard;

impl ClipboardSink for NoopClipboard {
    fn set_text(&self, _text: &str) -> Result<()> {
        Ok(())
    }
}
