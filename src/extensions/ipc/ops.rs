//! Capability surface installed into every provider's engine.
//!
//! The global `Awery` object is the only way guest code reaches the host.
//! Functions are grouped by concern below; each one borrows the instance's
//! [`BridgeContext`] and reports misuse by throwing into the guest.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use rquickjs::function::{Opt, Rest};
use rquickjs::{Ctx, Exception, Function, Object, Persistent, Value};
use tracing::Level;

use super::context::{BridgeContext, GuestCallback};
use super::convert::{from_js, to_js};
use super::types::FetchRequest;
use crate::extensions::callback::Settle;
use crate::extensions::codec::dates::{decode_date, encode_date};
use crate::extensions::codec::FromGuest;
use crate::extensions::error::ExtensionError;
use crate::extensions::lock;
use crate::extensions::settings::SettingItem;
use crate::extensions::storage::PrefKind;
use crate::extensions::value::GuestValue;

const TYPED_ACCESSORS: &[(&str, &str, PrefKind)] = &[
    ("getBoolean", "setBoolean", PrefKind::Boolean),
    ("getInteger", "setInteger", PrefKind::Integer),
    ("getFloat", "setFloat", PrefKind::Float),
    ("getString", "setString", PrefKind::String),
    ("getStringSet", "setStringSet", PrefKind::StringSet),
];

/// Install the `Awery` and `console` globals.
pub(crate) fn install<'js>(ctx: &Ctx<'js>, bridge: &Rc<BridgeContext>) -> rquickjs::Result<()> {
    let awery = Object::new(ctx.clone())?;

    install_manifest(ctx, &awery, bridge)?;
    install_logging(ctx, &awery, bridge)?;
    install_fetch(ctx, &awery, bridge)?;
    install_timers(ctx, &awery, bridge)?;
    install_storage(ctx, &awery, bridge)?;
    install_settings(ctx, &awery, bridge)?;
    install_dates(ctx, &awery)?;

    let console = Object::new(ctx.clone())?;
    for (name, level) in [
        ("log", Level::INFO),
        ("info", Level::INFO),
        ("debug", Level::DEBUG),
        ("warn", Level::WARN),
        ("error", Level::ERROR),
    ] {
        console.set(name, log_function(ctx, bridge, level)?)?;
    }

    let globals = ctx.globals();
    for name in ["setTimeout", "clearTimeout"] {
        globals.set(name, awery.get::<_, Function>(name)?)?;
    }
    globals.set("Awery", awery)?;
    globals.set("console", console)?;
    Ok(())
}

fn throw(ctx: &Ctx<'_>, message: &str) -> rquickjs::Error {
    Exception::throw_message(ctx, message)
}

// ─────────────────────────────────────────────────────────────────────────────
// Manifest
// ─────────────────────────────────────────────────────────────────────────────

fn install_manifest<'js>(
    ctx: &Ctx<'js>,
    awery: &Object<'js>,
    bridge: &Rc<BridgeContext>,
) -> rquickjs::Result<()> {
    let bridge = bridge.clone();
    awery.set(
        "setManifest",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, manifest: Value<'js>| -> rquickjs::Result<()> {
                let manifest = from_js(&manifest).map_err(|e| throw(&ctx, &e))?;
                bridge
                    .set_manifest(&manifest)
                    .map_err(|e| throw(&ctx, &e))
            },
        )?,
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

fn install_logging<'js>(
    ctx: &Ctx<'js>,
    awery: &Object<'js>,
    bridge: &Rc<BridgeContext>,
) -> rquickjs::Result<()> {
    for (name, level) in [
        ("log", Level::INFO),
        ("debug", Level::DEBUG),
        ("warn", Level::WARN),
        ("error", Level::ERROR),
    ] {
        awery.set(name, log_function(ctx, bridge, level)?)?;
    }
    Ok(())
}

fn log_function<'js>(
    ctx: &Ctx<'js>,
    bridge: &Rc<BridgeContext>,
    level: Level,
) -> rquickjs::Result<Function<'js>> {
    let bridge = bridge.clone();
    Function::new(ctx.clone(), move |args: Rest<Value<'js>>| {
        let message = args
            .0
            .iter()
            .map(describe_value)
            .collect::<Vec<_>>()
            .join(" ");
        emit(level, &bridge.label(), &message);
    })
}

fn emit(level: Level, extension: &str, message: &str) {
    match level {
        Level::ERROR => tracing::error!(target: "awery_bridge::guest", extension, "{message}"),
        Level::WARN => tracing::warn!(target: "awery_bridge::guest", extension, "{message}"),
        Level::DEBUG => tracing::debug!(target: "awery_bridge::guest", extension, "{message}"),
        Level::TRACE => tracing::trace!(target: "awery_bridge::guest", extension, "{message}"),
        _ => tracing::info!(target: "awery_bridge::guest", extension, "{message}"),
    }
}

/// Render a value for a log line. Error objects print their message.
fn describe_value(value: &Value<'_>) -> String {
    if let Some(message) = error_message(value) {
        return message;
    }
    match from_js(value) {
        Ok(GuestValue::Null) if value.is_undefined() => "undefined".to_string(),
        Ok(value) => value.to_string(),
        Err(_) => "[unprintable]".to_string(),
    }
}

fn error_message(value: &Value<'_>) -> Option<String> {
    let object = value.as_object()?;
    let message = object.get::<_, Option<String>>("message").ok().flatten()?;
    let stack = object.get::<_, Option<String>>("stack").ok().flatten();
    stack.is_some().then_some(message)
}

// ─────────────────────────────────────────────────────────────────────────────
// Fetch
// ─────────────────────────────────────────────────────────────────────────────

fn install_fetch<'js>(
    ctx: &Ctx<'js>,
    awery: &Object<'js>,
    bridge: &Rc<BridgeContext>,
) -> rquickjs::Result<()> {
    let bridge = bridge.clone();
    awery.set(
        "fetch",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>,
                  request: Value<'js>,
                  callback: Value<'js>|
                  -> rquickjs::Result<()> {
                let request = from_js(&request)
                    .and_then(|request| FetchRequest::from_guest(&request))
                    .map_err(|e| throw(&ctx, &e))?;

                let callback = callback
                    .into_object()
                    .filter(|callback| callback.get::<_, Function>("resolve").is_ok())
                    .ok_or_else(|| throw(&ctx, "fetch requires a { resolve, reject } callback"))?;

                let callback = GuestCallback::Fetch(Persistent::save(&ctx, callback));
                let id = bridge.register_callback(callback);
                bridge.spawn_fetch(id, request);
                Ok(())
            },
        )?,
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Timers
// ─────────────────────────────────────────────────────────────────────────────

fn install_timers<'js>(
    ctx: &Ctx<'js>,
    awery: &Object<'js>,
    bridge: &Rc<BridgeContext>,
) -> rquickjs::Result<()> {
    let set_bridge = bridge.clone();
    awery.set(
        "setTimeout",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, callback: Function<'js>, delay: Opt<f64>| -> f64 {
                let delay = delay.0.filter(|ms| ms.is_finite() && *ms > 0.0).unwrap_or(0.0);
                let callback = GuestCallback::Timer(Persistent::save(&ctx, callback));
                let id = set_bridge.register_callback(callback);
                set_bridge.spawn_timer(id, Duration::from_millis(delay as u64));
                id as f64
            },
        )?,
    )?;

    let clear_bridge = bridge.clone();
    awery.set(
        "clearTimeout",
        Function::new(ctx.clone(), move |id: Opt<f64>| -> bool {
            match id.0 {
                Some(id) if id >= 0.0 => matches!(
                    clear_bridge.take_callback(id as u64),
                    Some(GuestCallback::Timer(_))
                ),
                _ => false,
            }
        })?,
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────────────────────────────────────

fn install_storage<'js>(
    ctx: &Ctx<'js>,
    awery: &Object<'js>,
    bridge: &Rc<BridgeContext>,
) -> rquickjs::Result<()> {
    for &(getter, setter, kind) in TYPED_ACCESSORS {
        let get_bridge = bridge.clone();
        awery.set(
            getter,
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>,
                      key: String,
                      default: Opt<Value<'js>>|
                      -> rquickjs::Result<Value<'js>> {
                    let storage = get_bridge.storage().map_err(|e| throw(&ctx, &e))?;
                    let stored = lock(&storage).get_as(&key, kind);
                    match (stored, default.0) {
                        (Some(value), _) => to_js(&ctx, &value),
                        (None, Some(default)) => Ok(default),
                        (None, None) => Ok(Value::new_null(ctx.clone())),
                    }
                },
            )?,
        )?;

        let set_bridge = bridge.clone();
        awery.set(
            setter,
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, key: String, value: Value<'js>| -> rquickjs::Result<()> {
                    let storage = set_bridge.storage().map_err(|e| throw(&ctx, &e))?;
                    let value = from_js(&value).map_err(|e| throw(&ctx, &e))?;
                    let stored = lock(&storage)
                        .set_as(&key, kind, &value)
                        .map_err(|e| throw(&ctx, &e.to_string()))?;
                    set_bridge.sync_setting(&key, Some(&stored));
                    Ok(())
                },
            )?,
        )?;
    }

    let remove_bridge = bridge.clone();
    awery.set(
        "removeValue",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, key: String| -> rquickjs::Result<bool> {
                let storage = remove_bridge.storage().map_err(|e| throw(&ctx, &e))?;
                let removed = lock(&storage)
                    .remove(&key)
                    .map_err(|e| throw(&ctx, &e.to_string()))?;
                if removed {
                    remove_bridge.sync_setting(&key, None);
                }
                Ok(removed)
            },
        )?,
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

fn install_settings<'js>(
    ctx: &Ctx<'js>,
    awery: &Object<'js>,
    bridge: &Rc<BridgeContext>,
) -> rquickjs::Result<()> {
    let add_bridge = bridge.clone();
    awery.set(
        "addSetting",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>,
                  item: Value<'js>,
                  parent: Opt<String>|
                  -> rquickjs::Result<String> {
                let settings = add_bridge.settings().map_err(|e| throw(&ctx, &e))?;
                let item = from_js(&item)
                    .and_then(|item| SettingItem::from_guest(&item).map_err(|e| e.to_string()))
                    .map_err(|e| throw(&ctx, &e))?;

                let mut tree = lock(&settings);
                let parent = match parent.0 {
                    Some(key) => tree
                        .find_full_key(&key)
                        .ok_or_else(|| throw(&ctx, &format!("no setting named '{key}'")))?,
                    None => tree.root(),
                };
                let id = tree
                    .insert(parent, item)
                    .map_err(|e| throw(&ctx, &e.to_string()))?;
                Ok(tree.full_key(id))
            },
        )?,
    )?;

    let remove_bridge = bridge.clone();
    awery.set(
        "removeSetting",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, key: String| -> rquickjs::Result<bool> {
                let settings = remove_bridge.settings().map_err(|e| throw(&ctx, &e))?;
                let mut tree = lock(&settings);
                let removed = tree
                    .find_full_key(&key)
                    .filter(|id| tree.node(*id).is_some_and(|node| node.action.is_none()))
                    .and_then(|id| tree.remove(id));
                Ok(removed.is_some())
            },
        )?,
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Dates
// ─────────────────────────────────────────────────────────────────────────────

fn install_dates<'js>(ctx: &Ctx<'js>, awery: &Object<'js>) -> rquickjs::Result<()> {
    awery.set(
        "now",
        Function::new(ctx.clone(), || chrono::Utc::now().timestamp_millis() as f64)?,
    )?;
    awery.set(
        "parseDate",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, value: Value<'js>| -> rquickjs::Result<Value<'js>> {
                let value = from_js(&value).map_err(|e| throw(&ctx, &e))?;
                match decode_date(&value) {
                    Some(date) => to_js(&ctx, &encode_date(&date)),
                    None => Ok(Value::new_null(ctx.clone())),
                }
            },
        )?,
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Call callbacks
// ─────────────────────────────────────────────────────────────────────────────

/// Build the `{ resolve, reject, isCancelled }` object appended to every
/// provider method call.
pub(crate) fn callback_object<'js>(
    ctx: &Ctx<'js>,
    settle: &Arc<dyn Settle>,
) -> rquickjs::Result<Object<'js>> {
    let (resolve, reject) = settle_functions(ctx, settle, false)?;
    let object = Object::new(ctx.clone())?;
    object.set("resolve", resolve)?;
    object.set("reject", reject)?;

    let cancelled = settle.clone();
    object.set(
        "isCancelled",
        Function::new(ctx.clone(), move || cancelled.is_cancelled())?,
    )?;
    Ok(object)
}

/// Native `resolve`/`reject` pair settling `settle`.
///
/// With `skip_undefined`, resolving with `undefined` leaves the call open.
/// Used when chaining a returned promise, since `async` guest functions that
/// settle through their callback fulfil with `undefined`.
pub(crate) fn settle_functions<'js>(
    ctx: &Ctx<'js>,
    settle: &Arc<dyn Settle>,
    skip_undefined: bool,
) -> rquickjs::Result<(Function<'js>, Function<'js>)> {
    let resolve_settle = settle.clone();
    let resolve = Function::new(ctx.clone(), move |value: Opt<Value<'js>>| -> bool {
        let value = match value.0 {
            Some(value) if value.is_undefined() && skip_undefined => return false,
            None if skip_undefined => return false,
            Some(value) => from_js(&value),
            None => Ok(GuestValue::Null),
        };
        match value {
            Ok(value) => resolve_settle.resolve(value),
            Err(e) => resolve_settle.reject(ExtensionError::Engine(format!(
                "cannot read resolved value: {e}"
            ))),
        }
    })?;

    let reject_settle = settle.clone();
    let reject = Function::new(ctx.clone(), move |reason: Opt<Value<'js>>| -> bool {
        reject_settle.reject(rejection_error(reason.0.as_ref()))
    })?;

    Ok((resolve, reject))
}

/// Convert a rejection reason into an error.
pub(crate) fn rejection_error(reason: Option<&Value<'_>>) -> ExtensionError {
    let Some(reason) = reason else {
        return ExtensionError::guest("rejected without a reason");
    };

    if let Some(object) = reason.as_object() {
        if let Some(message) = object.get::<_, Option<String>>("message").ok().flatten() {
            return ExtensionError::Guest {
                message,
                stack: object.get::<_, Option<String>>("stack").ok().flatten(),
            };
        }
    }

    match from_js(reason) {
        Ok(GuestValue::Null) => ExtensionError::guest("rejected without a reason"),
        Ok(value) => ExtensionError::guest(value.to_string()),
        Err(e) => ExtensionError::guest(e),
    }
}
