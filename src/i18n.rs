/// i18n lookup boundary. The string table lives with the extension manifest;
/// the core only ever asks for a key with a fallback.
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(module = "/js/bridge.js")]
extern "C" {
    #[wasm_bindgen(js_name = translateMessage)]
    fn translate_message(key: &str) -> String;
}

#[cfg(target_arch = "wasm32")]
pub fn translate(key: &str, dflt: &str) -> String {
    let msg = translate_message(key);
    if !msg.is_empty() {
        msg
    } else if !dflt.is_empty() {
        dflt.to_string()
    } else {
        key.to_string()
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub fn translate(key: &str, dflt: &str) -> String {
    if dflt.is_empty() {
        key.to_string()
    } else {
        dflt.to_string()
    }
}
