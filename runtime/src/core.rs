//! Session core — engine, module, linker, and store for one session.
//!
//! The store is shared behind a mutex because the worker thread holds it for
//! the whole `_water_worker` call while construction, role entries, and
//! typed-export lookups need it earlier from the session thread. The guest
//! is single-threaded either way; the mutex just pins down who is driving
//! it.

use std::sync::{Arc, Mutex, MutexGuard};

use wasmtime::{Engine, Instance, Linker, Module, Store, Strategy, WasmParams};
use wasi_common::sync::WasiCtxBuilder;
use wasi_common::WasiCtx;

use crate::config::WatmConfig;
use crate::error::RuntimeError;
use crate::host::{lock, HostCtx, SessionShared};

/// Owns the engine instance, the linker, and the module store for one
/// session, plus a reference to the immutable config.
pub struct Core {
    engine: Engine,
    module: Module,
    linker: Linker<HostCtx>,
    store: Arc<Mutex<Store<HostCtx>>>,
    instance: Option<Instance>,
    shared: Arc<SessionShared>,
    config: Arc<WatmConfig>,
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core").finish_non_exhaustive()
    }
}

impl Core {
    /// Compile the module and prepare an un-instantiated session core.
    pub fn new(config: WatmConfig) -> Result<Self, RuntimeError> {
        if config.module_bytes.is_empty() {
            return Err(RuntimeError::Config("module binary is empty".into()));
        }
        let config = Arc::new(config);

        let engine = create_engine(&config)?;
        let module = Module::new(&engine, &config.module_bytes)?;

        let shared = Arc::new(SessionShared::new(config.workarounds));
        if let Some(source) = &config.module_config {
            let blob = source
                .load()
                .map_err(|e| RuntimeError::Config(format!("module config: {e}")))?;
            *lock(&shared.config_blob) = Some(blob);
        }

        let wasi = build_wasi_ctx(&config)?;
        let store = Store::new(
            &engine,
            HostCtx {
                wasi,
                shared: shared.clone(),
            },
        );
        let linker = Linker::new(&engine);

        Ok(Core {
            engine,
            module,
            linker,
            store: Arc::new(Mutex::new(store)),
            instance: None,
            shared,
            config,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn config(&self) -> &WatmConfig {
        &self.config
    }

    pub fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    pub fn linker_mut(&mut self) -> &mut Linker<HostCtx> {
        &mut self.linker
    }

    pub fn store(&self) -> &Arc<Mutex<Store<HostCtx>>> {
        &self.store
    }

    pub fn lock_store(&self) -> MutexGuard<'_, Store<HostCtx>> {
        lock(&self.store)
    }

    /// Add the engine's WASI implementation to the linker.
    pub fn link_wasi(&mut self) -> Result<(), RuntimeError> {
        wasi_common::sync::add_to_linker(&mut self.linker, |ctx: &mut HostCtx| &mut ctx.wasi)?;
        Ok(())
    }

    /// Instantiate after all imports are linked.
    pub fn instantiate(&mut self) -> Result<(), RuntimeError> {
        let instance = {
            let mut store = self.lock_store();
            self.linker.instantiate(&mut *store, &self.module)?
        };
        self.instance = Some(instance);
        Ok(())
    }

    pub fn instance(&self) -> Result<Instance, RuntimeError> {
        self.instance
            .ok_or_else(|| RuntimeError::InvalidState("module not instantiated"))
    }

    /// Call an all-i32 export and return its raw result.
    ///
    /// Missing or mistyped exports surface as ABI violations; traps as
    /// `GuestTrapped`.
    pub fn call_i32<P: WasmParams>(&self, name: &str, params: P) -> Result<i32, RuntimeError> {
        let instance = self.instance()?;
        let mut store = self.lock_store();
        let func = instance
            .get_typed_func::<P, i32>(&mut *store, name)
            .map_err(|e| RuntimeError::AbiViolation(format!("export '{name}': {e}")))?;
        func.call(&mut *store, params)
            .map_err(|e| RuntimeError::GuestTrapped(format!("{e:#}")))
    }
}

/// Create an engine honoring the interpreter-forcing flag.
fn create_engine(config: &WatmConfig) -> Result<Engine, RuntimeError> {
    let mut wasm_config = wasmtime::Config::new();
    if config.force_interpreter {
        // Baseline single-pass tier instead of the optimizing compiler.
        wasm_config.strategy(Strategy::Winch);
    }
    Ok(Engine::new(&wasm_config)?)
}

/// Build the guest's WASI context from the session config.
fn build_wasi_ctx(config: &WatmConfig) -> Result<WasiCtx, RuntimeError> {
    let mut builder = WasiCtxBuilder::new();
    if config.inherit_stdio {
        builder.inherit_stdio();
    }
    if !config.argv.is_empty() {
        builder
            .args(&config.argv)
            .map_err(|e| RuntimeError::Config(format!("argv: {e}")))?;
    }
    if !config.envv.is_empty() {
        builder
            .envs(&config.envv)
            .map_err(|e| RuntimeError::Config(format!("envv: {e}")))?;
    }
    for (host_path, guest_path) in &config.preopen_dirs {
        let dir = cap_std::fs::Dir::open_ambient_dir(host_path, cap_std::ambient_authority())
            .map_err(|e| {
                RuntimeError::Config(format!("preopen {}: {e}", host_path.display()))
            })?;
        builder
            .preopened_dir(dir, guest_path)
            .map_err(|e| RuntimeError::Config(format!("preopen {guest_path}: {e}")))?;
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIVIAL: &str = r#"
        (module
            (func (export "_water_v0"))
            (func (export "_water_init") (result i32) (i32.const 0))
        )
    "#;

    #[test]
    fn test_empty_module_bytes_rejected() {
        let err = Core::new(WatmConfig::new(Vec::new())).unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[test]
    fn test_garbage_module_rejected() {
        let err = Core::new(WatmConfig::new(b"not wasm".to_vec())).unwrap_err();
        assert!(matches!(err, RuntimeError::Wasmtime(_)));
    }

    #[test]
    fn test_instantiate_and_call() {
        let mut core = Core::new(WatmConfig::new(TRIVIAL.as_bytes().to_vec())).unwrap();
        core.link_wasi().unwrap();
        core.instantiate().unwrap();
        assert_eq!(core.call_i32("_water_init", ()).unwrap(), 0);
    }

    #[test]
    fn test_call_before_instantiate_fails() {
        let core = Core::new(WatmConfig::new(TRIVIAL.as_bytes().to_vec())).unwrap();
        let err = core.call_i32("_water_init", ()).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidState(_)));
    }

    #[test]
    fn test_missing_export_is_abi_violation() {
        let mut core = Core::new(WatmConfig::new(TRIVIAL.as_bytes().to_vec())).unwrap();
        core.link_wasi().unwrap();
        core.instantiate().unwrap();
        let err = core.call_i32("_water_absent", ()).unwrap_err();
        assert!(matches!(err, RuntimeError::AbiViolation(_)));
    }

    #[test]
    fn test_missing_config_file_is_config_error() {
        let config = WatmConfig::new(TRIVIAL.as_bytes().to_vec())
            .with_config_file("/no/such/file/anywhere");
        let err = Core::new(config).unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }
}
