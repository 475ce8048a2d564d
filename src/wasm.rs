//! Browser bindings.
//!
//! The browser build has no page rasterizer, so deep strategies are rejected
//! and the structural re-save does the work.

use wasm_bindgen::prelude::*;

use crate::engine::default_engine;
use crate::orchestrator::{CompressionOrchestrator, ProgressEvent};
use crate::types::CompressionResult;

/// Result handed back to JavaScript.
#[wasm_bindgen]
pub struct CompressionOutput {
    result: CompressionResult,
}

#[wasm_bindgen]
impl CompressionOutput {
    #[wasm_bindgen(getter)]
    pub fn bytes(&self) -> Vec<u8> {
        self.result.bytes().to_vec()
    }

    #[wasm_bindgen(getter, js_name = originalSize)]
    pub fn original_size(&self) -> usize {
        self.result.stats().original_size
    }

    #[wasm_bindgen(getter, js_name = compressedSize)]
    pub fn compressed_size(&self) -> usize {
        self.result.stats().compressed_size
    }

    #[wasm_bindgen(getter, js_name = percentReduction)]
    pub fn percent_reduction(&self) -> f64 {
        self.result.stats().percent_reduction
    }

    #[wasm_bindgen(getter, js_name = compressionRatio)]
    pub fn compression_ratio(&self) -> f64 {
        self.result.stats().compression_ratio
    }

    #[wasm_bindgen(getter)]
    pub fn strategy(&self) -> String {
        self.result.strategy().to_string()
    }

    #[wasm_bindgen(getter)]
    pub fn skipped(&self) -> bool {
        self.result.skipped()
    }
}

/// Compresses `input`. Never throws for PDF problems: unreadable or
/// incompressible input comes back unchanged with `skipped` set.
///
/// `on_progress`, when given, is called as `on_progress(message, fraction)`.
#[wasm_bindgen]
pub fn compress_pdf(input: &[u8], on_progress: Option<js_sys::Function>) -> CompressionOutput {
    let mut orchestrator = CompressionOrchestrator::new(default_engine());
    if let Some(callback) = on_progress {
        orchestrator = orchestrator.with_observer(move |event: &ProgressEvent| {
            let message = JsValue::from_str(&event.message());
            let fraction = JsValue::from_f64(event.fraction());
            if let Err(e) = callback.call2(&JsValue::NULL, &message, &fraction) {
                web_sys::console::warn_2(&"progress callback failed".into(), &e);
            }
        });
    }

    let result = orchestrator.compress_or_passthrough(input.to_vec());
    web_sys::console::log_1(
        &format!(
            "{} compression: {} -> {} bytes",
            result.strategy(),
            result.stats().original_size,
            result.stats().compressed_size
        )
        .into(),
    );
    CompressionOutput { result }
}

#[wasm_bindgen(js_name = determineOptimalScale)]
pub fn determine_optimal_scale(width: f64, height: f64, base_scale: f64) -> f64 {
    crate::orchestrator::determine_optimal_scale(width, height, base_scale)
}

#[wasm_bindgen(js_name = compressedFileName)]
pub fn compressed_file_name(original: &str) -> String {
    crate::intake::compressed_file_name(original)
}
