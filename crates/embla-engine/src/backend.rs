// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use llama_cpp_2::llama_backend::LlamaBackend;
use tracing::debug;

use crate::error::EngineError;

/// Refcounted gate around the process-wide llama.cpp backend.
///
/// The native init/free pair is not thread-safe, so both only ever run
/// under this lock: the `0 → 1` acquire initializes, the `1 → 0` release
/// drops the gate's handle.  The lock is held only for the counter update
/// and the init call itself, never across other work.
struct Gate {
    refs: usize,
    backend: Option<Arc<LlamaBackend>>,
}

static GATE: Mutex<Gate> = Mutex::new(Gate { refs: 0, backend: None });

/// Acquire a handle on the shared backend, initializing it on first use.
pub(crate) fn acquire() -> Result<Arc<LlamaBackend>, EngineError> {
    let mut gate = GATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let backend = match &gate.backend {
        Some(backend) => Arc::clone(backend),
        None => {
            debug!("initializing llama backend");
            let backend = LlamaBackend::init()
                .map_err(|e| EngineError::FailedToLoad(format!("backend init failed: {e}")))?;
            let backend = Arc::new(backend);
            gate.backend = Some(Arc::clone(&backend));
            backend
        }
    };
    gate.refs += 1;
    Ok(backend)
}

/// Release one handle.  The final release drops the gate's reference; the
/// native teardown runs when the last outstanding `Arc` (the caller's,
/// dropped before calling this) is gone.
pub(crate) fn release() {
    let mut gate = GATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    gate.refs = gate.refs.saturating_sub(1);
    if gate.refs == 0 {
        debug!("releasing llama backend");
        gate.backend = None;
    }
}

#[cfg(test)]
pub(crate) fn refcount() -> usize {
    GATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).refs
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // All refcount assertions live in one test: unit tests run on multiple
    // threads and the gate is process-global, so independent tests would
    // race on the counter.
    #[test]
    fn acquire_release_cycles_balance() {
        let start = refcount();

        let a = acquire().expect("backend init");
        assert_eq!(refcount(), start + 1);

        let b = acquire().expect("second acquire");
        assert_eq!(refcount(), start + 2);
        assert!(Arc::ptr_eq(&a, &b), "both handles share one backend");

        drop(b);
        release();
        assert_eq!(refcount(), start + 1);

        drop(a);
        release();
        assert_eq!(refcount(), start);

        // Re-acquire after full release must re-initialize cleanly.
        let c = acquire().expect("re-acquire after teardown");
        assert_eq!(refcount(), start + 1);
        drop(c);
        release();
    }
}
