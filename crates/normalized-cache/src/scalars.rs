use std::{collections::HashMap, fmt, sync::Arc};

use serde_json::Value;

/// Converts the wire representation of a custom scalar into the value the cache stores.
pub trait ScalarHandler: Send + Sync {
    fn unmarshal(&self, value: Value) -> Value;
}

impl<F> ScalarHandler for F
where
    F: Fn(Value) -> Value + Send + Sync,
{
    fn unmarshal(&self, value: Value) -> Value {
        self(value)
    }
}

#[derive(Default, Clone)]
pub struct ScalarRegistry {
    handlers: HashMap<String, Arc<dyn ScalarHandler>>,
}

impl fmt::Debug for ScalarRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarRegistry")
            .field("types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ScalarRegistry {
    pub fn register(&mut self, type_name: impl Into<String>, handler: impl ScalarHandler + 'static) {
        self.handlers.insert(type_name.into(), Arc::new(handler));
    }

    /// Applies the handler of `type_name`, element-wise for lists. Nulls are left alone.
    pub fn unmarshal(&self, type_name: &str, value: Value) -> Value {
        let Some(handler) = self.handlers.get(type_name) else {
            return value;
        };

        unmarshal_with(handler.as_ref(), value)
    }
}

fn unmarshal_with(handler: &dyn ScalarHandler, value: Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Array(items) => Value::Array(items.into_iter().map(|item| unmarshal_with(handler, item)).collect()),
        value => handler.unmarshal(value),
    }
}
