//! Extension contract shared between the host and every plugin module.
//!
//! A plugin is a dynamic library that carries three things:
//!
//! - an embedded descriptor block (product name, version, ...) that the host
//!   reads straight from the file bytes, without running any plugin code
//! - a `KINDLING_ABI_VERSION` static the host compares against [`ABI_VERSION`]
//! - a `kindling_extension_entry` function returning an [`ExtensionVTable`]
//!
//! Every vtable call runs inside `catch_unwind` on the module's side of the
//! boundary. A module links its own copy of std, so its panics can only be
//! stopped there; the host sees a [`CallStatus`] and a [`PanicMessage`].
//!
//! The [`declare_extension!`](crate::declare_extension) macro emits all three.
//!
//! # Example
//!
//! ```rust,ignore
//! use kindling::plugins::api::{Extension, HostHandle};
//!
//! #[derive(Default)]
//! pub struct Clock;
//!
//! impl Extension for Clock {
//!     fn initialize(&mut self, host: &HostHandle) -> bool {
//!         host.version().starts_with("1.")
//!     }
//!
//!     fn terminate(&mut self) {}
//! }
//!
//! kindling::declare_extension!(Clock, product = "Kindling Plugin", version = "0.3.0");
//! ```

use std::ffi::c_void;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Version of the binary contract between host and extension modules.
///
/// Bumped whenever [`Extension`], [`ExtensionVTable`] or the entry point
/// signature changes.
pub const ABI_VERSION: u32 = 3;

/// Exported function every current-generation module provides.
pub const ENTRY_SYMBOL: &[u8] = b"kindling_extension_entry";

/// Exported `u32` static holding the module's [`ABI_VERSION`].
pub const ABI_VERSION_SYMBOL: &[u8] = b"KINDLING_ABI_VERSION";

/// Marker that opens an embedded descriptor block.
///
/// Must stay in sync with the literal inside [`declare_descriptor!`](crate::declare_descriptor).
pub const DESCRIPTOR_MAGIC: &[u8] = b"@@KINDLING-DESCRIPTOR@@";

/// Product name a module must declare to be considered one of ours.
pub const DEFAULT_PRODUCT_NAME: &str = "Kindling Plugin";

/// Entry point exported by first-generation plugins, which handed the host a
/// raw `*mut dyn Plugin`. Its presence in a module that fails to load is the
/// legacy-generation signal.
pub const LEGACY_ENTRY_SYMBOL: &str = "_plugin_create";

/// Capabilities the host exposes to every extension at initialize time.
pub trait PluginHost: Send + Sync {
    /// Host application name
    fn name(&self) -> &str;

    /// Host application version
    fn version(&self) -> &str;

    /// Directory plugins were loaded from, if the host tracks one
    fn plugin_dir(&self) -> Option<&Path> {
        None
    }
}

/// The single process-wide host capability handed to extensions.
pub type HostHandle = Arc<dyn PluginHost>;

/// Two-phase contract implemented by each extension module's entry type.
pub trait Extension {
    /// Activate the extension. Returning `false` declines activation; the
    /// host then drops the instance without calling [`Extension::terminate`].
    fn initialize(&mut self, host: &HostHandle) -> bool;

    /// Release everything acquired in `initialize`. Called exactly once per
    /// successfully initialized instance, during unload.
    fn terminate(&mut self);
}

/// Boxed extension as it lives inside its module.
pub type ExtensionBox = Box<dyn Extension>;

/// Result code of a call through an [`ExtensionVTable`].
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallStatus(pub i32);

impl CallStatus {
    pub const OK: Self = Self(0);
    /// `initialize` returned `false`
    pub const DECLINED: Self = Self(1);
    /// The call panicked; the [`PanicMessage`] holds the payload text
    pub const PANICKED: Self = Self(2);
}

/// Capacity of [`PanicMessage`] in bytes
pub const PANIC_MESSAGE_CAPACITY: usize = 256;

/// Fixed buffer a module writes panic text into, owned by the caller.
#[repr(C)]
pub struct PanicMessage {
    len: usize,
    bytes: [u8; PANIC_MESSAGE_CAPACITY],
}

impl PanicMessage {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            len: 0,
            bytes: [0; PANIC_MESSAGE_CAPACITY],
        }
    }

    /// Store `text`, truncated on a char boundary to fit.
    pub fn set(&mut self, text: &str) {
        let mut len = text.len().min(PANIC_MESSAGE_CAPACITY);
        while !text.is_char_boundary(len) {
            len -= 1;
        }
        self.bytes[..len].copy_from_slice(&text.as_bytes()[..len]);
        self.len = len;
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        let len = self.len.min(PANIC_MESSAGE_CAPACITY);
        std::str::from_utf8(&self.bytes[..len]).unwrap_or("<malformed panic message>")
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for PanicMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PanicMessage").field(&self.as_str()).finish()
    }
}

/// Functions a module exposes for one extension type.
///
/// `instance` pointers are opaque to the host: they are produced by `create`
/// and released by `destroy`, both inside the module. `host` points at the
/// caller's [`HostHandle`]. Host and module must be built with the same
/// toolchain and `kindling` version; [`ABI_VERSION`] is checked before the
/// entry point is called.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ExtensionVTable {
    pub create: unsafe extern "C" fn(out: *mut *mut c_void, message: *mut PanicMessage) -> CallStatus,
    pub initialize: unsafe extern "C" fn(
        instance: *mut c_void,
        host: *const c_void,
        message: *mut PanicMessage,
    ) -> CallStatus,
    pub terminate: unsafe extern "C" fn(instance: *mut c_void, message: *mut PanicMessage) -> CallStatus,
    pub destroy: unsafe extern "C" fn(instance: *mut c_void, message: *mut PanicMessage) -> CallStatus,
}

impl ExtensionVTable {
    /// Vtable serving `T`, constructed with `T::default()`.
    #[must_use]
    pub const fn of<T: Extension + Default + 'static>() -> Self {
        Self {
            create: export::create::<T>,
            initialize: export::initialize,
            terminate: export::terminate,
            destroy: export::destroy,
        }
    }
}

impl fmt::Debug for ExtensionVTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionVTable").finish_non_exhaustive()
    }
}

/// Signature of [`ENTRY_SYMBOL`]: a pointer to a vtable in static storage.
pub type ExtensionEntry = unsafe extern "C" fn() -> *const ExtensionVTable;

/// Trampolines behind [`ExtensionVTable::of`]. They are compiled into the
/// module that invokes [`declare_extension!`](crate::declare_extension), so
/// `catch_unwind` here runs against the module's own panic runtime.
#[doc(hidden)]
pub mod export {
    use std::ffi::c_void;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    use super::{CallStatus, Extension, ExtensionBox, HostHandle, PanicMessage};
    use crate::plugins::lifecycle::panic_message;

    fn guarded(message: *mut PanicMessage, call: impl FnOnce() -> CallStatus) -> CallStatus {
        match catch_unwind(AssertUnwindSafe(call)) {
            Ok(status) => status,
            Err(payload) => {
                // Safety: callers pass null or a live, exclusive buffer.
                if let Some(message) = unsafe { message.as_mut() } {
                    message.set(&panic_message(&*payload));
                }
                CallStatus::PANICKED
            }
        }
    }

    /// # Safety
    /// `out` must be valid for a pointer write.
    pub unsafe extern "C" fn create<T: Extension + Default + 'static>(
        out: *mut *mut c_void,
        message: *mut PanicMessage,
    ) -> CallStatus {
        guarded(message, || {
            let instance: ExtensionBox = Box::new(T::default());
            // Safety: guaranteed by the caller.
            unsafe { out.write(Box::into_raw(Box::new(instance)).cast()) };
            CallStatus::OK
        })
    }

    /// # Safety
    /// `instance` must come from `create` and `host` must point at a live
    /// [`HostHandle`].
    pub unsafe extern "C" fn initialize(
        instance: *mut c_void,
        host: *const c_void,
        message: *mut PanicMessage,
    ) -> CallStatus {
        guarded(message, || {
            // Safety: guaranteed by the caller.
            let (extension, host) = unsafe {
                (
                    &mut *instance.cast::<ExtensionBox>(),
                    &*host.cast::<HostHandle>(),
                )
            };
            if extension.initialize(host) {
                CallStatus::OK
            } else {
                CallStatus::DECLINED
            }
        })
    }

    /// # Safety
    /// `instance` must come from `create` and not have been destroyed.
    pub unsafe extern "C" fn terminate(
        instance: *mut c_void,
        message: *mut PanicMessage,
    ) -> CallStatus {
        guarded(message, || {
            // Safety: guaranteed by the caller.
            unsafe { &mut *instance.cast::<ExtensionBox>() }.terminate();
            CallStatus::OK
        })
    }

    /// # Safety
    /// `instance` must come from `create`; it is freed and must not be reused.
    pub unsafe extern "C" fn destroy(
        instance: *mut c_void,
        message: *mut PanicMessage,
    ) -> CallStatus {
        guarded(message, || {
            // Safety: guaranteed by the caller.
            drop(unsafe { Box::from_raw(instance.cast::<ExtensionBox>()) });
            CallStatus::OK
        })
    }
}

/// Export the descriptor block for a module without declaring an entry point.
#[macro_export]
macro_rules! declare_descriptor {
    (
        product = $product:literal,
        version = $version:literal
        $(, description = $description:literal)?
        $(, company = $company:literal)?
        $(,)?
    ) => {
        #[no_mangle]
        #[used]
        pub static KINDLING_DESCRIPTOR: &str = concat!(
            "@@KINDLING-DESCRIPTOR@@",
            "ProductName=", $product, "\0",
            "ProductVersion=", $version, "\0",
            $("FileDescription=", $description, "\0",)?
            $("CompanyName=", $company, "\0",)?
            "\0"
        );
    };
}

/// Export the descriptor, ABI version and entry point for an extension type.
///
/// The type must implement [`Extension`] and [`Default`].
#[macro_export]
macro_rules! declare_extension {
    (
        $ty:ty,
        product = $product:literal,
        version = $version:literal
        $(, description = $description:literal)?
        $(, company = $company:literal)?
        $(,)?
    ) => {
        #[no_mangle]
        pub static KINDLING_ABI_VERSION: u32 = $crate::plugins::api::ABI_VERSION;

        $crate::declare_descriptor!(
            product = $product,
            version = $version
            $(, description = $description)?
            $(, company = $company)?
        );

        #[no_mangle]
        pub extern "C" fn kindling_extension_entry() -> *const $crate::plugins::api::ExtensionVTable {
            static VTABLE: $crate::plugins::api::ExtensionVTable =
                $crate::plugins::api::ExtensionVTable::of::<$ty>();
            &VTABLE
        }
    };
}
