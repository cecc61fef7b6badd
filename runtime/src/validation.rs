//! WATM validation — ABI compatibility checks.
//!
//! Validates a compiled module against the v0 surface before a session is
//! built around it. Checks:
//!
//! 1. Required exports present with all-i32 signatures (a module missing
//!    `_water_worker` is rejected here, before any thread is spawned)
//! 2. Imports only from `env` or the engine's WASI module
//! 3. Imports are functions

use wasmtime::{ExternType, Module, ValType};
use water_abi::v0;

use crate::error::RuntimeError;

/// Import module names a WATM may use.
const ALLOWED_IMPORT_MODULES: &[&str] = &[v0::HOST_MODULE, "wasi_snapshot_preview1"];

/// Check if a ValType is i32.
fn is_i32(vt: &ValType) -> bool {
    matches!(vt, ValType::I32)
}

/// Validate that a module meets the v0 WATER ABI requirements.
pub fn validate_v0_module(module: &Module) -> Result<(), RuntimeError> {
    validate_exports(module)?;
    validate_imports(module)?;
    Ok(())
}

fn check_signature(
    module: &Module,
    name: &str,
    expected_params: usize,
    expected_results: usize,
    required: bool,
) -> Result<(), RuntimeError> {
    let export = match module.exports().find(|e| e.name() == name) {
        Some(e) => e,
        None if required => {
            return Err(RuntimeError::AbiViolation(format!(
                "missing required export: {name}"
            )));
        }
        None => return Ok(()),
    };

    let func_ty = match export.ty() {
        ExternType::Func(ft) => ft,
        _ => {
            return Err(RuntimeError::AbiViolation(format!(
                "export '{name}' must be a function"
            )));
        }
    };

    let params: Vec<ValType> = func_ty.params().collect();
    let results: Vec<ValType> = func_ty.results().collect();

    if params.len() != expected_params || !params.iter().all(is_i32) {
        return Err(RuntimeError::AbiViolation(format!(
            "export '{name}' has wrong param signature: expected {expected_params} i32 params, got {}",
            params.len()
        )));
    }
    if results.len() != expected_results || !results.iter().all(is_i32) {
        return Err(RuntimeError::AbiViolation(format!(
            "export '{name}' has wrong result signature: expected {expected_results} i32 results, got {}",
            results.len()
        )));
    }
    Ok(())
}

/// Required exports must exist; role entries are checked only when exported.
fn validate_exports(module: &Module) -> Result<(), RuntimeError> {
    for &(name, params, results) in v0::REQUIRED_EXPORTS {
        check_signature(module, name, params, results, true)?;
    }
    for &(name, params, results) in v0::ROLE_EXPORTS {
        check_signature(module, name, params, results, false)?;
    }
    Ok(())
}

/// Imports must be functions from `env` or WASI.
fn validate_imports(module: &Module) -> Result<(), RuntimeError> {
    for import in module.imports() {
        let module_name = import.module();
        if !ALLOWED_IMPORT_MODULES.contains(&module_name) {
            return Err(RuntimeError::AbiViolation(format!(
                "import from unknown module '{}': {}",
                module_name,
                import.name()
            )));
        }
        if !matches!(import.ty(), ExternType::Func(_)) {
            return Err(RuntimeError::AbiViolation(format!(
                "non-function import not allowed: {}::{}",
                module_name,
                import.name()
            )));
        }
    }
    Ok(())
}
