// Extension loading:
// - Native modules through libloading, behind a fixed exported vtable
// - ABI version pre-check before any Rust type crosses the boundary
// - Module-side panics reported as status codes, re-raised host-side
// - In-process factories for statically linked extensions
use libloading::{Library, Symbol};
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::mem::ManuallyDrop;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::path::Path;
use std::ptr;
use tracing::{debug, error};

use super::api::{
    CallStatus, Extension, ExtensionBox, ExtensionEntry, ExtensionVTable, HostHandle,
    PanicMessage, ABI_VERSION, ABI_VERSION_SYMBOL, ENTRY_SYMBOL,
};
use super::error::LoadError;
use super::lifecycle::panic_message;

/// Conventional entry name for a module file: `Foo.dll` -> `Foo.dllExt`.
///
/// Identifies the extension in logs and records; the instance itself comes
/// from the module's exported factory.
#[must_use]
pub fn entry_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    format!("{stem}.{ext}Ext")
}

/// A constructed extension together with the library backing its code.
pub struct ExtensionHandle {
    instance: ManuallyDrop<ExtensionBox>,
    // Declared after `instance`; the library must outlive the instance's drop.
    library: Option<Library>,
}

impl ExtensionHandle {
    /// Wrap an instance whose code lives in `library`
    #[must_use]
    pub fn from_library(instance: ExtensionBox, library: Library) -> Self {
        Self {
            instance: ManuallyDrop::new(instance),
            library: Some(library),
        }
    }

    /// Wrap an instance whose code is linked into the host
    #[must_use]
    pub fn in_process(instance: ExtensionBox) -> Self {
        Self {
            instance: ManuallyDrop::new(instance),
            library: None,
        }
    }

    #[must_use]
    pub fn extension(&self) -> &dyn Extension {
        &**self.instance
    }

    pub fn extension_mut(&mut self) -> &mut dyn Extension {
        &mut **self.instance
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.library.is_some()
    }
}

impl Drop for ExtensionHandle {
    fn drop(&mut self) {
        // Safety: `instance` is taken exactly once, here, and never touched again.
        let instance = unsafe { ManuallyDrop::take(&mut self.instance) };
        if let Err(payload) = catch_unwind(AssertUnwindSafe(move || drop(instance))) {
            error!(
                "Extension panicked while being dropped: {}",
                panic_message(&*payload)
            );
        }
    }
}

impl fmt::Debug for ExtensionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionHandle")
            .field("dynamic", &self.is_dynamic())
            .finish_non_exhaustive()
    }
}

/// Host-side view of an instance that lives behind a module's vtable.
///
/// A panic reported by the module is re-raised here as a host panic, so the
/// lifecycle's `catch_unwind` classifies it like any in-process panic.
struct ModuleExtension {
    vtable: ExtensionVTable,
    instance: *mut c_void,
}

impl ModuleExtension {
    fn create(vtable: ExtensionVTable, path: &Path) -> Result<Self, LoadError> {
        let mut instance: *mut c_void = ptr::null_mut();
        let mut message = PanicMessage::new();
        // Safety: both out-pointers are live locals.
        let status = unsafe { (vtable.create)(&mut instance, &mut message) };

        match status {
            CallStatus::OK if !instance.is_null() => Ok(Self { vtable, instance }),
            CallStatus::PANICKED => Err(LoadError::LoadFailed {
                path: path.to_path_buf(),
                reason: format!("constructor panicked: {message}"),
            }),
            other => Err(LoadError::InvalidExtensionType {
                path: path.to_path_buf(),
                entry: entry_name(path),
                reason: format!("constructor returned no instance (status {})", other.0),
            }),
        }
    }

    fn check(status: CallStatus, message: PanicMessage) {
        if status == CallStatus::PANICKED {
            resume_unwind(Box::new(message.to_string()));
        }
    }
}

impl Extension for ModuleExtension {
    fn initialize(&mut self, host: &HostHandle) -> bool {
        let mut message = PanicMessage::new();
        let host: *const HostHandle = host;
        // Safety: `instance` came from this vtable's `create` and is still live.
        let status =
            unsafe { (self.vtable.initialize)(self.instance, host.cast(), &mut message) };
        Self::check(status, message);
        status == CallStatus::OK
    }

    fn terminate(&mut self) {
        let mut message = PanicMessage::new();
        // Safety: as in `initialize`.
        let status = unsafe { (self.vtable.terminate)(self.instance, &mut message) };
        Self::check(status, message);
    }
}

impl Drop for ModuleExtension {
    fn drop(&mut self) {
        let mut message = PanicMessage::new();
        // Safety: `instance` is released exactly once, here.
        let status = unsafe { (self.vtable.destroy)(self.instance, &mut message) };
        if status == CallStatus::PANICKED {
            error!("Extension panicked while being dropped: {message}");
        }
    }
}

/// Turns a validated module file into an extension instance.
pub trait ModuleLoader {
    /// Load `path` and construct its extension. On error nothing is retained.
    fn load(&self, path: &Path) -> Result<ExtensionHandle, LoadError>;
}

/// Loads native modules with `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicLibraryLoader;

impl DynamicLibraryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLoader for DynamicLibraryLoader {
    fn load(&self, path: &Path) -> Result<ExtensionHandle, LoadError> {
        let incompatible = |reason: String| LoadError::IncompatibleFormat {
            path: path.to_path_buf(),
            reason,
        };
        let invalid = |reason: String| LoadError::InvalidExtensionType {
            path: path.to_path_buf(),
            entry: entry_name(path),
            reason,
        };

        // Safety: opening a library runs its initializers. Modules reaching this
        // point declared our product name; their code is trusted to be sound.
        let library = unsafe { Library::new(path) }.map_err(|e| incompatible(e.to_string()))?;

        // Pre-check with a plain u32 so no Rust type crosses the boundary yet.
        let module_abi = unsafe {
            let symbol: Symbol<*const u32> = library
                .get(ABI_VERSION_SYMBOL)
                .map_err(|_| incompatible("no ABI version exported".to_string()))?;
            let ptr = *symbol;
            if ptr.is_null() {
                return Err(incompatible("ABI version symbol is null".to_string()));
            }
            ptr.read()
        };
        if module_abi != ABI_VERSION {
            return Err(incompatible(format!(
                "built for ABI {module_abi}, host speaks ABI {ABI_VERSION}"
            )));
        }

        let vtable = {
            let entry: Symbol<ExtensionEntry> = unsafe { library.get(ENTRY_SYMBOL) }
                .map_err(|_| invalid("no extension entry point exported".to_string()))?;

            // Safety: the ABI check above guarantees the entry signature; the
            // entry only returns the address of a static.
            let vtable = unsafe { entry() };
            if vtable.is_null() {
                return Err(invalid("entry point returned null".to_string()));
            }
            // Safety: non-null and pointing into the still-loaded library.
            unsafe { *vtable }
        };

        let instance = ModuleExtension::create(vtable, path)?;
        debug!("Constructed {} from {}", entry_name(path), path.display());

        Ok(ExtensionHandle::from_library(Box::new(instance), library))
    }
}

/// Factory for an extension linked into the host
pub type ExtensionFactory = Box<dyn Fn() -> ExtensionBox>;

/// Serves extensions compiled into the host, keyed by module file name.
///
/// The module file still has to exist and carry a valid descriptor; only the
/// instantiation step is replaced. Unknown file names are treated as modules
/// this host cannot load.
#[derive(Default)]
pub struct InProcessLoader {
    factories: HashMap<String, ExtensionFactory>,
}

impl InProcessLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `file_name` (e.g. `Clock.dll`) from `factory`
    #[must_use]
    pub fn register<F>(mut self, file_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> ExtensionBox + 'static,
    {
        self.factories.insert(file_name.into(), Box::new(factory));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl ModuleLoader for InProcessLoader {
    fn load(&self, path: &Path) -> Result<ExtensionHandle, LoadError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        let factory = self
            .factories
            .get(file_name)
            .ok_or_else(|| LoadError::IncompatibleFormat {
                path: path.to_path_buf(),
                reason: "no in-process module registered for this file".to_string(),
            })?;

        let instance = catch_unwind(AssertUnwindSafe(|| factory())).map_err(|payload| {
            LoadError::LoadFailed {
                path: path.to_path_buf(),
                reason: format!("constructor panicked: {}", panic_message(&*payload)),
            }
        })?;

        Ok(ExtensionHandle::in_process(instance))
    }
}

impl fmt::Debug for InProcessLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessLoader")
            .field("modules", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
