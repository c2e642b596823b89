// JS-backed adapters for the gaze source, local storage, and dwell callback.
// Host calls go through js-sys reflection so any object with the right methods works
// (the webgazer global, `window.localStorage`, or a test double). Failures are logged,
// never surfaced: the pipeline degrades to "no event".

use js_sys::{Function, Reflect};
use log::warn;
use wasm_bindgen::{JsCast, JsValue};

use crate::dwell::DwellListener;
use crate::error::EngineError;
use crate::session::{GazeSource, TrackingStore};
use crate::types::DwellEvent;

fn host_error(method: &str, err: JsValue) -> EngineError {
    EngineError::HostCall {
        method: method.to_string(),
        message: err.as_string().unwrap_or_else(|| format!("{:?}", err)),
    }
}

/// Call `target[method](...args)`.
fn call_method(target: &JsValue, method: &str, args: &[JsValue]) -> Result<JsValue, EngineError> {
    let value = Reflect::get(target, &JsValue::from_str(method)).map_err(|e| host_error(method, e))?;
    let function: Function = value.dyn_into().map_err(|_| EngineError::HostCall {
        method: method.to_string(),
        message: "not a function".to_string(),
    })?;

    let result = match args {
        [] => function.call0(target),
        [a] => function.call1(target, a),
        [a, b] => function.call2(target, a, b),
        _ => {
            let array: js_sys::Array = args.iter().collect();
            function.apply(target, &array)
        }
    };
    result.map_err(|e| host_error(method, e))
}

/// Gaze source handle. Detached until the page attaches the estimator object.
#[derive(Debug, Default)]
pub struct JsGazeSource {
    handle: Option<JsValue>,
}

impl JsGazeSource {
    pub fn new(handle: JsValue) -> Self {
        JsGazeSource {
            handle: Some(handle),
        }
    }

    pub fn detached() -> Self {
        JsGazeSource { handle: None }
    }

    pub fn is_attached(&self) -> bool {
        self.handle.is_some()
    }

    fn invoke(&self, method: &str) {
        let Some(handle) = &self.handle else {
            return;
        };
        if let Err(err) = call_method(handle, method, &[]) {
            warn!("{}", err);
        }
    }
}

impl GazeSource for JsGazeSource {
    fn begin(&mut self) {
        self.invoke("begin");
    }

    fn pause(&mut self) {
        self.invoke("pause");
    }

    fn resume(&mut self) {
        self.invoke("resume");
    }

    fn end(&mut self) {
        self.invoke("end");
    }

    fn clear_data(&mut self) {
        self.invoke("clearData");
    }
}

/// Web Storage-like object (`removeItem(key)`).
#[derive(Debug, Default)]
pub struct JsStorage {
    handle: Option<JsValue>,
}

impl JsStorage {
    pub fn new(handle: JsValue) -> Self {
        JsStorage {
            handle: Some(handle),
        }
    }

    pub fn detached() -> Self {
        JsStorage { handle: None }
    }

    pub fn is_attached(&self) -> bool {
        self.handle.is_some()
    }
}

impl TrackingStore for JsStorage {
    fn remove_item(&mut self, key: &str) {
        let Some(handle) = &self.handle else {
            warn!("No storage attached, cannot remove {:?}", key);
            return;
        };
        if let Err(err) = call_method(handle, "removeItem", &[JsValue::from_str(key)]) {
            warn!("{}", err);
        }
    }
}

/// Delivers dwell events to a JS function as a JSON string.
pub struct JsDwellCallback {
    callback: Function,
}

impl JsDwellCallback {
    pub fn new(callback: Function) -> Self {
        JsDwellCallback { callback }
    }
}

impl DwellListener for JsDwellCallback {
    fn on_dwell(&mut self, event: &DwellEvent) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(err) => {
                warn!("Could not serialize dwell event: {}", err);
                return;
            }
        };
        if let Err(err) = self.callback.call1(&JsValue::NULL, &JsValue::from_str(&json)) {
            warn!("{}", host_error("onDwell", err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Attached handles need a JS runtime; see tests/web.rs.

    #[test]
    fn detached_source_ignores_lifecycle_calls() {
        let mut source = JsGazeSource::detached();
        assert!(!source.is_attached());
        source.begin();
        source.pause();
        source.resume();
        source.clear_data();
        source.end();
    }

    #[test]
    fn detached_storage_ignores_removal() {
        let mut storage = JsStorage::default();
        assert!(!storage.is_attached());
        storage.remove_item("webgazerGlobalData");
    }
}
