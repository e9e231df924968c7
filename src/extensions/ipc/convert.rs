//! Conversion between engine values and [`GuestValue`].

use std::collections::BTreeMap;

use rquickjs::function::This;
use rquickjs::{Array, Ctx, Function, Object, Value};

use crate::extensions::value::GuestValue;

/// Nesting limit for guest records. Deeper structures (usually cycles) fail
/// the conversion instead of exhausting the stack.
const MAX_DEPTH: usize = 64;

/// Convert a host value into an engine value.
pub(crate) fn to_js<'js>(ctx: &Ctx<'js>, value: &GuestValue) -> rquickjs::Result<Value<'js>> {
    Ok(match value {
        GuestValue::Null => Value::new_null(ctx.clone()),
        GuestValue::Bool(b) => Value::new_bool(ctx.clone(), *b),
        GuestValue::Number(n) => Value::new_number(ctx.clone(), *n),
        GuestValue::String(s) => rquickjs::String::from_str(ctx.clone(), s)?.into_value(),
        GuestValue::Sequence(items) => {
            let array = Array::new(ctx.clone())?;
            for (index, item) in items.iter().enumerate() {
                array.set(index, to_js(ctx, item)?)?;
            }
            array.into_value()
        }
        GuestValue::Mapping(map) => {
            let object = Object::new(ctx.clone())?;
            for (key, item) in map {
                object.set(key.as_str(), to_js(ctx, item)?)?;
            }
            object.into_value()
        }
    })
}

/// Convert an engine value into a host value.
///
/// `undefined` becomes null, functions and symbols are dropped, and `Date`
/// objects become epoch milliseconds.
pub(crate) fn from_js(value: &Value<'_>) -> Result<GuestValue, String> {
    convert(value, 0)
}

fn convert(value: &Value<'_>, depth: usize) -> Result<GuestValue, String> {
    if depth > MAX_DEPTH {
        return Err(format!("value nested deeper than {MAX_DEPTH} levels"));
    }

    if value.is_undefined() || value.is_null() {
        return Ok(GuestValue::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(GuestValue::Bool(b));
    }
    if let Some(n) = value.as_int() {
        return Ok(GuestValue::Number(f64::from(n)));
    }
    if let Some(n) = value.as_float() {
        return Ok(GuestValue::Number(n));
    }
    if let Some(s) = value.as_string() {
        return s.to_string().map(GuestValue::String).map_err(|e| e.to_string());
    }
    if let Some(array) = value.as_array() {
        let mut items = Vec::with_capacity(array.len());
        for item in array.iter::<Value>() {
            let item = item.map_err(|e| e.to_string())?;
            items.push(convert(&item, depth + 1)?);
        }
        return Ok(GuestValue::Sequence(items));
    }
    if value.is_function() {
        return Ok(GuestValue::Null);
    }
    if let Some(object) = value.as_object() {
        if let Some(millis) = date_millis(object)? {
            return Ok(GuestValue::Number(millis));
        }

        let mut map = BTreeMap::new();
        for entry in object.props::<String, Value>() {
            let (key, item) = entry.map_err(|e| e.to_string())?;
            if item.is_function() || item.is_undefined() {
                continue;
            }
            map.insert(key, convert(&item, depth + 1)?);
        }
        return Ok(GuestValue::Mapping(map));
    }

    Ok(GuestValue::Null)
}

fn date_millis(object: &Object<'_>) -> Result<Option<f64>, String> {
    let (Ok(get_time), Ok(_)) = (
        object.get::<_, Function>("getTime"),
        object.get::<_, Function>("toISOString"),
    ) else {
        return Ok(None);
    };
    get_time
        .call::<_, f64>((This(object.clone()),))
        .map(Some)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};
    use serde_json::json;

    fn with_ctx<R>(f: impl FnOnce(Ctx<'_>) -> R) -> R {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(f)
    }

    #[test]
    fn test_from_js_records() {
        let value = with_ctx(|ctx| {
            let value: Value = ctx
                .eval(r#"({ id: "1", n: 2, list: [true, null, undefined], skip: () => 1 })"#)
                .unwrap();
            from_js(&value).unwrap()
        });

        assert_eq!(
            value,
            GuestValue::from(json!({"id": "1", "n": 2, "list": [true, null, null]}))
        );
    }

    #[test]
    fn test_dates_become_millis() {
        let value = with_ctx(|ctx| {
            let value: Value = ctx.eval("new Date(86400000)").unwrap();
            from_js(&value).unwrap()
        });
        assert_eq!(value, GuestValue::Number(86_400_000.0));
    }

    #[test]
    fn test_cycles_fail() {
        let result = with_ctx(|ctx| {
            let value: Value = ctx.eval("const a = {}; a.self = a; a").unwrap();
            from_js(&value)
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_to_js_and_back() {
        let original = GuestValue::from(json!({"items": [{"title": "A"}], "hasNextPage": false}));
        let restored = with_ctx(|ctx| {
            let value = to_js(&ctx, &original).unwrap();
            from_js(&value).unwrap()
        });
        assert_eq!(restored, original);
    }
}
