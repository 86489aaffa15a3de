//! Binding and invocation of inbound function calls.
//!
//! Wire parameters arrive as a name to value map. Each value is matched to
//! the function's parameter slot of the same name and converted to the
//! slot's type; names without a slot are ignored and slots without a value
//! receive `null`.

use std::sync::Arc;

use hublink_core::{
    Arguments, EventData, Function, FunctionCall, FunctionCallInfo, ParameterType, Service,
};
use serde_json::{Map, Number, Value};
use tracing::{debug, info};

use crate::error::DispatchError;

/// Converts a wire value to the given parameter type.
///
/// Primitive types accept any primitive JSON value that converts without
/// loss of meaning (`"42"` for an integer, `1` for a boolean, ...). A
/// structured parameter sent as a string is parsed as JSON.
pub fn coerce(kind: ParameterType, raw: &Value) -> Result<Value, String> {
    match kind {
        ParameterType::Integer => {
            let n = to_i64(raw)?;
            i32::try_from(n)
                .map(Value::from)
                .map_err(|_| format!("{n} is out of range for a 32-bit integer"))
        }
        ParameterType::Long => to_i64(raw).map(Value::from),
        ParameterType::Number => {
            let f = to_f64(raw)?;
            Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| format!("{f} is not a finite number"))
        }
        ParameterType::String => match raw {
            Value::String(s) => Ok(Value::String(s.clone())),
            Value::Null => Err("null is not a string".to_string()),
            other => Ok(Value::String(other.to_string())),
        },
        ParameterType::Boolean => match raw {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("'{s}' is not a boolean")),
            },
            other => Err(format!("{other} is not a boolean")),
        },
        ParameterType::Structured => match raw {
            Value::String(s) => serde_json::from_str(s).map_err(|e| e.to_string()),
            other => Ok(other.clone()),
        },
    }
}

fn to_i64(raw: &Value) -> Result<i64, String> {
    match raw {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            let f = n.as_f64().unwrap_or(f64::NAN);
            float_to_i64(f)
        }
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => Ok(i),
                Err(_) => s
                    .parse::<f64>()
                    .map_err(|_| format!("'{s}' is not an integer"))
                    .and_then(float_to_i64),
            }
        }
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(format!("{other} is not an integer")),
    }
}

fn float_to_i64(f: f64) -> Result<i64, String> {
    let rounded = f.round_ties_even();
    if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded <= i64::MAX as f64 {
        Ok(rounded as i64)
    } else {
        Err(format!("{f} is out of range for an integer"))
    }
}

fn to_f64(raw: &Value) -> Result<f64, String> {
    match raw {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{n} is not a number")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not a number")),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(format!("{other} is not a number")),
    }
}

/// Builds the positional argument list for `function` from wire parameters.
pub fn bind_arguments(
    function: &Function,
    parameters: &Map<String, Value>,
) -> Result<Arguments, DispatchError> {
    let mut values = vec![Value::Null; function.parameters().len()];
    for (name, raw) in parameters {
        let Some(slot) = function.parameter(name) else {
            debug!(function_id = %function.id, parameter = %name, "ignoring unknown parameter");
            continue;
        };
        values[slot.position] = coerce(slot.kind, raw).map_err(|reason| DispatchError::Parameter {
            name: name.clone(),
            reason,
        })?;
    }
    Ok(Arguments::new(values))
}

/// Looks up the called function on a registered service.
pub fn resolve(
    service: Option<Arc<Service>>,
    call: &FunctionCall,
) -> Result<(Arc<Service>, Function), DispatchError> {
    let service = service.ok_or_else(|| DispatchError::UnknownService(call.service_uuid.clone()))?;
    let function = service
        .function_by_id(&call.function_id)
        .cloned()
        .ok_or_else(|| DispatchError::UnknownFunction {
            function_id: call.function_id.clone(),
            service_uuid: call.service_uuid.clone(),
        })?;
    Ok((service, function))
}

/// Binds and invokes a function call.
///
/// Returns the response event to publish, already carrying the call's
/// correlation id, or `None` if the callable produced nothing to publish.
/// The callable runs on the blocking pool; a panic is reported as
/// [`DispatchError::Panicked`].
pub async fn execute(
    service: Arc<Service>,
    function: Function,
    call: FunctionCall,
) -> Result<Option<EventData>, DispatchError> {
    let args = bind_arguments(&function, &call.parameters)?;
    let info = FunctionCallInfo::new(call.correlation_id.clone(), service, function.clone());
    let invocable = function.invocable().clone();

    let result = tokio::task::spawn_blocking(move || invocable.invoke(&args, &info))
        .await
        .map_err(|_| DispatchError::Panicked)??;

    let Some(mut response) = result else {
        return Ok(None);
    };
    if response.is_no_response() {
        info!(function_id = %function.id, "function produced no response event");
        return Ok(None);
    }
    if !function.declares_response(&response.event.id) {
        return Err(DispatchError::UndeclaredResponse {
            event_id: response.event.id,
            function_id: function.id,
        });
    }
    response.correlation_id = call.correlation_id;
    Ok(Some(response))
}
