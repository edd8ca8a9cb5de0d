#[cfg(windows)]
mod windows;

#[cfg(windows)]
pub use self::windows::NativeWindowSource;

#[cfg(not(windows))]
pub use self::fallback::NativeWindowSource;

#[cfg(not(windows))]
mod fallback {
    use crate::window_source::{RawWindow, WindowSource};

    /// Window enumeration is only implemented for Windows; elsewhere every
    /// tick sees an empty desktop.
    #[derive(Debug, Default)]
    pub struct NativeWindowSource {
        warned: bool,
    }

    impl NativeWindowSource {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl WindowSource for NativeWindowSource {
        fn top_level_windows(&mut self) -> Vec<RawWindow> {
            if !self.warned {
                log::warn!("window enumeration is not supported on this platform; no usage will accrue");
                self.warned = true;
            }
            Vec::new()
        }
    }
}
