//! Extension module for the native loading tests.
//!
//! Every behaviour is a cargo feature of this one crate. The module appends
//! `<behaviour> <event>` lines to `journal.log` in the host's plugin directory
//! so the tests can observe calls made across the library boundary.

use kindling::plugins::api::{Extension, HostHandle};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

const BEHAVIOR: &str = if cfg!(feature = "panic-create") {
    "panic-create"
} else if cfg!(feature = "panic-initialize") {
    "panic-initialize"
} else if cfg!(feature = "panic-terminate") {
    "panic-terminate"
} else if cfg!(feature = "wrong-abi") {
    "wrong-abi"
} else {
    "good"
};

pub struct Fixture {
    journal: Option<PathBuf>,
}

impl Fixture {
    fn record(&self, event: &str) {
        let Some(path) = &self.journal else {
            return;
        };
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{BEHAVIOR} {event}");
        }
    }
}

impl Default for Fixture {
    fn default() -> Self {
        if cfg!(feature = "panic-create") {
            panic!("fixture constructor failure");
        }
        Self { journal: None }
    }
}

impl Extension for Fixture {
    fn initialize(&mut self, host: &HostHandle) -> bool {
        self.journal = host.plugin_dir().map(|dir| dir.join("journal.log"));
        self.record("initialize");
        if cfg!(feature = "panic-initialize") {
            panic!("fixture initialize failure");
        }
        true
    }

    fn terminate(&mut self) {
        self.record("terminate");
        if cfg!(feature = "panic-terminate") {
            panic!("fixture terminate failure");
        }
    }
}

#[cfg(not(any(feature = "no-entry", feature = "wrong-abi", feature = "legacy")))]
kindling::declare_extension!(Fixture, product = "Kindling Plugin", version = "0.1.0");

#[cfg(feature = "no-entry")]
mod exports {
    #[no_mangle]
    pub static KINDLING_ABI_VERSION: u32 = kindling::plugins::api::ABI_VERSION;

    kindling::declare_descriptor!(product = "Kindling Plugin", version = "0.1.0");
}

#[cfg(feature = "wrong-abi")]
mod exports {
    use kindling::plugins::api::{ExtensionVTable, ABI_VERSION};

    #[no_mangle]
    pub static KINDLING_ABI_VERSION: u32 = ABI_VERSION + 1;

    kindling::declare_descriptor!(product = "Kindling Plugin", version = "0.1.0");

    #[no_mangle]
    pub extern "C" fn kindling_extension_entry() -> *const ExtensionVTable {
        static VTABLE: ExtensionVTable = ExtensionVTable::of::<super::Fixture>();
        &VTABLE
    }
}

#[cfg(feature = "legacy")]
mod exports {
    use std::ffi::c_void;

    kindling::declare_descriptor!(product = "Kindling Plugin", version = "0.1.0");

    #[no_mangle]
    pub extern "C" fn _plugin_create() -> *mut c_void {
        std::ptr::null_mut()
    }
}
