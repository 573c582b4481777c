//! Node bindings: run the built-in macros over one module.

use napi_derive::napi;
use serde::Deserialize;

use crate::config::MacroConfig;
use crate::engine::replace_macros_with;
use crate::macros::{ms_macro, preval_macro, style_macro, PrevalOptions, StyleOptions};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NativeOptions {
    #[serde(flatten)]
    config: MacroConfig,
    preval: PrevalOptions,
    style: StyleOptions,
}

#[napi(object)]
pub struct NativeResult {
    pub code: String,
    pub css: String,
}

#[napi]
pub fn replace_macros_native(code: String, options_json: Option<String>) -> napi::Result<NativeResult> {
    let options: NativeOptions = match options_json.as_deref() {
        Some(json) => {
            serde_json::from_str(json).map_err(|e| napi::Error::from_reason(e.to_string()))?
        }
        None => NativeOptions::default(),
    };

    let (style, sheet) = style_macro(options.style);
    let macros = vec![ms_macro(), preval_macro(options.preval), style];

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    let code = runtime
        .block_on(replace_macros_with(&options.config, &code, macros, None))
        .map_err(|e| napi::Error::from_reason(format!("[{}] {}", e.code(), e)))?;

    Ok(NativeResult {
        code,
        css: sheet.contents(),
    })
}
