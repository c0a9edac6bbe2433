//! Native extension loading.
//!
//! A native extension is a module exporting entry points with the host's
//! native calling convention (`NativeFn`). Modules are opened through a
//! `ModuleLoader` and kept open for the lifetime of the `ModuleCache` that
//! opened them; symbols are looked up again on every call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use ioexec_host::{Error, EvalState, LazyValue, LoaderError, NativeFn, Pos, Result};

use crate::context::realise_context;

/// An opened native module.
pub trait Library: Send + Sync {
    /// Look up an exported entry point. Errors carry the loader's
    /// diagnostic text.
    fn symbol(&self, name: &str) -> std::result::Result<NativeFn, String>;
}

/// Opens native modules by path.
///
/// # Object Safety
///
/// This trait is object-safe; the cache holds an `Arc<dyn ModuleLoader>`,
/// so tests can substitute an in-memory registry for the OS loader.
pub trait ModuleLoader: Send + Sync {
    /// Open the module at `path`. Errors carry the loader's diagnostic text.
    fn open(&self, path: &str) -> std::result::Result<Arc<dyn Library>, String>;
}

impl<T: ModuleLoader + ?Sized> ModuleLoader for Arc<T> {
    fn open(&self, path: &str) -> std::result::Result<Arc<dyn Library>, String> {
        self.as_ref().open(path)
    }
}

/// Modules opened so far, keyed by path.
///
/// Handles are never released. Each `invoke` resolves its symbol again.
pub struct ModuleCache {
    loader: Arc<dyn ModuleLoader>,
    handles: Mutex<HashMap<String, Arc<dyn Library>>>,
}

impl ModuleCache {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            loader,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct modules opened.
    pub fn len(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open `path`, reusing the handle if it was opened before.
    pub fn open(&self, path: &str) -> Result<Arc<dyn Library>> {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(module) = handles.get(path) {
            tracing::debug!(path, "module cache hit");
            return Ok(Arc::clone(module));
        }

        let module = self.loader.open(path).map_err(|diagnostic| LoaderError::Open {
            path: path.to_string(),
            diagnostic,
        })?;
        tracing::debug!(path, "opened module");
        handles.insert(path.to_string(), Arc::clone(&module));
        Ok(module)
    }

    /// Look up `symbol` in an opened module.
    pub fn resolve(&self, module: &dyn Library, path: &str, symbol: &str) -> Result<NativeFn> {
        let entry = module.symbol(symbol).map_err(|diagnostic| LoaderError::Symbol {
            symbol: symbol.to_string(),
            path: path.to_string(),
            diagnostic,
        })?;
        tracing::debug!(path, symbol, "resolved symbol");
        Ok(entry)
    }

    /// Call `symbol` from the module at `library` with the list `args`.
    ///
    /// The library path is coerced with its context, and the context is
    /// realised before the module is opened. Arguments are passed to the
    /// entry point unforced, and its result is returned as-is.
    pub fn invoke(
        &self,
        state: &EvalState,
        pos: &Pos,
        library: &LazyValue,
        symbol: &LazyValue,
        args: &LazyValue,
    ) -> Result<LazyValue> {
        let (path, context) = state.coerce_to_string(library, pos)?;
        realise_context(state.store(), &context).map_err(|e| match e {
            Error::InvalidPath { path: reference, .. } => Error::InvalidPath {
                message: format!(
                    "cannot dlopen `{}', since path `{}' is not valid, at {}",
                    path, reference, pos
                ),
                path: reference,
            },
            other => other,
        })?;

        let module = self.open(&path)?;
        let symbol = state.force_string_no_context(symbol, pos)?;
        let entry = self.resolve(module.as_ref(), &path, &symbol)?;
        let args = state.force_list(args, pos)?;
        entry(state, pos, args)
    }
}

/// An in-memory module registry.
///
/// # Example
///
/// ```rust
/// use ioexec::{ModuleLoader, StaticLoader};
/// use ioexec_host::{EvalState, LazyValue, Pos, Result, Value};
///
/// fn answer(_: &EvalState, _: &Pos, _: &[LazyValue]) -> Result<LazyValue> {
///     Ok(Value::Int(42).into())
/// }
///
/// let loader = StaticLoader::new().with_module("libanswer.so", &[("answer", answer)]);
/// let module = loader.open("libanswer.so").unwrap();
/// assert!(module.symbol("answer").is_ok());
/// assert!(loader.open("libother.so").is_err());
/// ```
#[derive(Default, Clone)]
pub struct StaticLoader {
    modules: HashMap<String, Arc<StaticModule>>,
}

#[derive(Default)]
struct StaticModule {
    symbols: HashMap<String, NativeFn>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module exporting `symbols` under `path`.
    pub fn with_module(mut self, path: impl Into<String>, symbols: &[(&str, NativeFn)]) -> Self {
        let module = StaticModule {
            symbols: symbols
                .iter()
                .map(|(name, entry)| (name.to_string(), *entry))
                .collect(),
        };
        self.modules.insert(path.into(), Arc::new(module));
        self
    }
}

impl ModuleLoader for StaticLoader {
    fn open(&self, path: &str) -> std::result::Result<Arc<dyn Library>, String> {
        match self.modules.get(path) {
            Some(module) => Ok(Arc::clone(module) as Arc<dyn Library>),
            None => Err(format!("{}: cannot open shared object file: No such file or directory", path)),
        }
    }
}

impl Library for StaticModule {
    fn symbol(&self, name: &str) -> std::result::Result<NativeFn, String> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| format!("undefined symbol: {}", name))
    }
}

#[cfg(unix)]
pub use dl::DlLoader;

#[cfg(unix)]
mod dl {
    use std::ffi::{c_void, CStr, CString};
    use std::sync::Arc;

    use ioexec_host::NativeFn;

    use super::{Library, ModuleLoader};

    /// Loads shared objects with the platform dynamic loader.
    ///
    /// Modules are opened with lazy binding and local symbol visibility. An
    /// entry point must be exported `#[no_mangle]` with the `NativeFn`
    /// signature and built with the same toolchain as the host.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct DlLoader;

    impl DlLoader {
        pub fn new() -> Self {
            Self
        }
    }

    struct DlModule {
        handle: *mut c_void,
    }

    // SAFETY: a dlopen handle is an opaque token; dlsym may be called on it
    // from any thread. The handle is never closed, so it cannot dangle.
    unsafe impl Send for DlModule {}
    unsafe impl Sync for DlModule {}

    /// Take the pending loader diagnostic, if any.
    fn take_dl_error() -> Option<String> {
        // SAFETY: dlerror returns null or a pointer to a NUL-terminated
        // string that stays valid until the next dl* call on this thread.
        unsafe {
            let message = libc::dlerror();
            if message.is_null() {
                None
            } else {
                Some(CStr::from_ptr(message).to_string_lossy().into_owned())
            }
        }
    }

    impl ModuleLoader for DlLoader {
        fn open(&self, path: &str) -> Result<Arc<dyn Library>, String> {
            let c_path = CString::new(path).map_err(|_| "path contains a NUL byte".to_string())?;
            // SAFETY: c_path is a valid NUL-terminated string. Loading runs
            // the module's initializers, which is what asking for it means.
            let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_LAZY | libc::RTLD_LOCAL) };
            if handle.is_null() {
                return Err(take_dl_error().unwrap_or_else(|| "unknown loader error".to_string()));
            }
            Ok(Arc::new(DlModule { handle }))
        }
    }

    impl Library for DlModule {
        fn symbol(&self, name: &str) -> Result<NativeFn, String> {
            let c_name = CString::new(name).map_err(|_| "symbol contains a NUL byte".to_string())?;
            take_dl_error();
            // SAFETY: handle came from a successful dlopen and is still open.
            let address = unsafe { libc::dlsym(self.handle, c_name.as_ptr()) };
            if let Some(message) = take_dl_error() {
                return Err(message);
            }
            if address.is_null() {
                return Err(format!("symbol `{}' resolved to null", name));
            }
            // SAFETY: extensions export their entry points with the NativeFn
            // signature; a mismatched export is undefined behavior the
            // module author must avoid.
            Ok(unsafe { std::mem::transmute::<*mut c_void, NativeFn>(address) })
        }
    }
}
