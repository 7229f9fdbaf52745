//! Interface-only seam to the external collaborators named in §1 as deliberately out
//! of scope: the desktop window/input/texture presenter and the screenshot encoder.
//! `retroforge-core` depends on nothing concrete here; `retroforge-desktop` is the
//! only implementor.

/// What a host presenter needs to pull from the engine each frame and push back in:
/// the rendered framebuffer out, raw button edges in. The façade never reaches for a
/// window handle itself — it only knows this trait.
pub trait Presenter {
    /// Blit `rgba` (row-major, `width * height * 4` bytes) to the screen.
    fn present(&mut self, rgba: &[u8], width: u32, height: u32);

    /// Whether the host wants the process to exit (window close button, OS signal).
    fn should_close(&self) -> bool;
}

/// Out-of-scope per §1 ("the screenshot encoder"): the façade only needs to know a
/// screenshot was requested and hand over pixels; PNG encoding and the filesystem
/// write live on the presenter side.
pub trait ScreenshotSink {
    /// `name` is the `screenshot-YYYYMMDD-HHMMSS.png` filename §6 specifies; failures
    /// (e.g. an unwritable filesystem) are swallowed by the implementor.
    fn save_screenshot(&mut self, name: &str, rgba: &[u8], width: u32, height: u32);
}
