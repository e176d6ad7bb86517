//! Structural validation of candidate configurations.
//!
//! A candidate must be a JSON object. `listeners` and `applications`,
//! when present, must be objects of objects, and a listener's
//! `application` member must name an existing application. Unknown root
//! members pass through untouched.

use serde_json::Value;

pub(crate) fn validate(root: &Value) -> bool {
    let Value::Object(map) = root else {
        return false;
    };

    let applications = match map.get("applications") {
        Some(Value::Object(applications)) => {
            if !applications.values().all(Value::is_object) {
                return false;
            }
            Some(applications)
        }
        Some(_) => return false,
        None => None,
    };

    match map.get("listeners") {
        Some(Value::Object(listeners)) => {
            for listener in listeners.values() {
                let Value::Object(fields) = listener else {
                    return false;
                };

                if let Some(application) = fields.get("application") {
                    let Value::String(name) = application else {
                        return false;
                    };
                    if !applications.is_some_and(|apps| apps.contains_key(name)) {
                        return false;
                    }
                }
            }
        }
        Some(_) => return false,
        None => {}
    }

    true
}
