//! QuickJS engine wrapper for one provider instance.
//!
//! An [`ExtensionIsolate`] owns a runtime and context and never leaves the
//! queue thread that created it. Loading runs the initialization state
//! machine; afterwards the isolate only executes queued jobs.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rquickjs::function::This;
use rquickjs::{
    CatchResultExt, CaughtError, Context, Exception, Function, Persistent, Runtime, Value,
};

use super::callback::Settle;
use super::codec::ToGuest;
use super::error::{ExtensionError, ExtensionResult};
use super::ipc::{
    self, callback_object, rejection_error, settle_functions, to_js, BridgeContext, FetchResponse,
    GuestCallback,
};
use super::manifest::ExtensionManifest;
use super::methods::GuestMethod;
use super::queue::{Job, LoadRequest, WeakQueue};
use super::settings::SharedSettings;
use super::storage::SharedStorage;
use super::value::GuestValue;

/// Initialization state of an isolate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsolateState {
    /// Engine created, capability surface being installed.
    Loading,
    /// Program text evaluated; waiting for `setManifest`.
    AwaitingManifest,
    /// Identity frozen and capability table built.
    Ready,
    /// Initialization failed. The isolate is discarded.
    Failed { message: String },
}

/// What a successful load hands back to the host.
#[derive(Debug)]
pub(crate) struct LoadedInstance {
    pub manifest: ExtensionManifest,
    pub methods: BTreeSet<GuestMethod>,
    pub settings: SharedSettings,
    pub storage: SharedStorage,
}

/// Execution deadline checked by the engine's interrupt handler.
struct Deadline {
    epoch: Instant,
    /// Milliseconds after `epoch`, or 0 when disarmed.
    at: AtomicU64,
    tripped: AtomicBool,
}

impl Deadline {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            at: AtomicU64::new(0),
            tripped: AtomicBool::new(false),
        }
    }

    fn now_millis(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn arm(&self, timeout: Duration) {
        let timeout = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.tripped.store(false, Ordering::Relaxed);
        self.at.store(
            self.now_millis().saturating_add(timeout).max(1),
            Ordering::Relaxed,
        );
    }

    fn disarm(&self) {
        self.at.store(0, Ordering::Relaxed);
    }

    /// Interrupt handler body: `true` stops the running script.
    fn check(&self) -> bool {
        let at = self.at.load(Ordering::Relaxed);
        if at != 0 && self.now_millis() >= at {
            self.tripped.store(true, Ordering::Relaxed);
            return true;
        }
        false
    }

    fn take_tripped(&self) -> bool {
        self.tripped.swap(false, Ordering::Relaxed)
    }
}

/// One provider's engine.
pub struct ExtensionIsolate {
    methods: HashMap<GuestMethod, Persistent<Function<'static>>>,
    bridge: Rc<BridgeContext>,
    context: Context,
    runtime: Runtime,
    state: IsolateState,
    deadline: Arc<Deadline>,
    execution_timeout: Duration,
}

impl ExtensionIsolate {
    /// Create the engine, evaluate the program text and build the
    /// capability table.
    pub(crate) fn load(
        request: LoadRequest,
        queue: WeakQueue,
    ) -> ExtensionResult<(Self, LoadedInstance)> {
        let LoadRequest {
            source,
            origin,
            data_dir,
            memory_limit,
            max_stack_size,
            execution_timeout,
            http,
        } = request;

        let runtime = Runtime::new()?;
        runtime.set_memory_limit(memory_limit);
        runtime.set_max_stack_size(max_stack_size);

        let deadline = Arc::new(Deadline::new());
        let handler_deadline = deadline.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || handler_deadline.check())));

        let context = Context::full(&runtime)?;
        let bridge = Rc::new(BridgeContext::new(&origin, data_dir, http, queue));
        context.with(|ctx| ipc::install(&ctx, &bridge))?;

        let mut isolate = Self {
            methods: HashMap::new(),
            bridge,
            context,
            runtime,
            state: IsolateState::Loading,
            deadline,
            execution_timeout,
        };

        isolate.state = IsolateState::AwaitingManifest;
        tracing::debug!(origin = %origin, "Evaluating extension");
        let evaluated = isolate.evaluate(source);

        if let Some(e) = isolate.bridge.take_manifest_error() {
            return Err(isolate.fail(e));
        }
        if let Err(e) = evaluated {
            return Err(isolate.fail(ExtensionError::LoadFailed {
                extension: origin,
                message: e.to_string(),
            }));
        }
        let Some(manifest) = isolate.bridge.manifest() else {
            return Err(isolate.fail(ExtensionError::Configuration {
                origin,
                message: "the extension never called Awery.setManifest".to_string(),
            }));
        };

        isolate.probe_methods()?;
        isolate.state = IsolateState::Ready;

        let loaded = LoadedInstance {
            methods: isolate.methods.keys().copied().collect(),
            settings: isolate.bridge.settings().map_err(ExtensionError::Settings)?,
            storage: isolate.bridge.storage().map_err(ExtensionError::Storage)?,
            manifest,
        };

        tracing::debug!(
            extension = %loaded.manifest.id,
            methods = loaded.methods.len(),
            "Extension ready"
        );
        Ok((isolate, loaded))
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &IsolateState {
        &self.state
    }

    /// Provider id, or the origin before the manifest is known.
    pub fn label(&self) -> String {
        self.bridge.label()
    }

    /// Run one queued job under the execution deadline, then drain
    /// promise jobs it scheduled.
    pub(crate) fn run(&mut self, job: Job) {
        self.deadline.arm(self.execution_timeout);
        job(self);
        self.drain_jobs();
        self.deadline.disarm();
    }

    /// Call a provider method with `args` plus the callback object.
    pub(crate) fn invoke(
        &mut self,
        method: GuestMethod,
        args: Vec<GuestValue>,
        settle: Arc<dyn Settle>,
    ) {
        let label = self.bridge.label();
        if settle.is_cancelled() {
            tracing::debug!(
                extension = %label,
                function = method.function_name(),
                "Skipping cancelled call"
            );
            return;
        }
        if self.state != IsolateState::Ready {
            settle.reject(ExtensionError::Uninstalled(label));
            return;
        }

        let Some(function) = self.methods.get(&method).cloned() else {
            settle.reject(ExtensionError::Unimplemented {
                extension: label,
                function: method.function_name(),
            });
            return;
        };

        tracing::trace!(
            extension = %label,
            function = method.function_name(),
            "Invoking guest method"
        );

        let deadline = &*self.deadline;
        let timeout = self.execution_timeout;
        let outcome = self.context.with(|ctx| -> ExtensionResult<()> {
            let function = function.restore(&ctx)?;

            let mut js_args = Vec::with_capacity(args.len() + 1);
            for arg in &args {
                js_args.push(to_js(&ctx, arg)?);
            }
            js_args.push(callback_object(&ctx, &settle)?.into_value());

            let returned = call_function(&function, js_args)
                .catch(&ctx)
                .map_err(|e| caught_error(e, deadline, timeout))?;

            if let Some(then) = thenable(&returned) {
                let (resolve, reject) = settle_functions(&ctx, &settle, true)?;
                then.call::<_, Value>((This(returned.clone()), resolve, reject))
                    .catch(&ctx)
                    .map_err(|e| caught_error(e, deadline, timeout))?;
            } else if method == GuestMethod::IsLoggedIn {
                if let Some(logged_in) = returned.as_bool() {
                    settle.resolve(GuestValue::Bool(logged_in));
                }
            }
            Ok(())
        });

        if let Err(e) = outcome {
            if settle.is_settled() {
                tracing::warn!(
                    extension = %label,
                    function = method.function_name(),
                    error = %e,
                    "Guest method failed after settling its callback"
                );
            } else {
                settle.reject(e);
            }
        }
    }

    /// Deliver a fetch outcome to the guest's `{ resolve, reject }` object.
    pub(crate) fn complete_fetch(&mut self, id: u64, outcome: Result<FetchResponse, String>) {
        let Some(GuestCallback::Fetch(callback)) = self.bridge.take_callback(id) else {
            return;
        };

        let deadline = &*self.deadline;
        let timeout = self.execution_timeout;
        let result = self.context.with(|ctx| -> ExtensionResult<()> {
            let callback = callback.restore(&ctx)?;
            let (name, argument) = match outcome {
                Ok(response) => ("resolve", to_js(&ctx, &response.to_guest())?),
                Err(message) => (
                    "reject",
                    Exception::from_message(ctx.clone(), &message)?
                        .into_object()
                        .into_value(),
                ),
            };

            let Some(handler) = callback.get::<_, Option<Function>>(name)? else {
                return Ok(());
            };
            handler
                .call::<_, Value>((This(callback), argument))
                .catch(&ctx)
                .map_err(|e| caught_error(e, deadline, timeout))?;
            Ok(())
        });

        if let Err(e) = result {
            tracing::warn!(
                extension = %self.bridge.label(),
                error = %e,
                "Guest fetch handler threw"
            );
        }
    }

    /// Run a timer callback unless it was cleared.
    pub(crate) fn fire_timer(&mut self, id: u64) {
        let Some(GuestCallback::Timer(callback)) = self.bridge.take_callback(id) else {
            return;
        };

        let deadline = &*self.deadline;
        let timeout = self.execution_timeout;
        let result = self.context.with(|ctx| -> ExtensionResult<()> {
            callback
                .restore(&ctx)?
                .call::<_, Value>(())
                .catch(&ctx)
                .map_err(|e| caught_error(e, deadline, timeout))?;
            Ok(())
        });

        if let Err(e) = result {
            tracing::warn!(extension = %self.bridge.label(), error = %e, "Guest timer threw");
        }
    }

    /// Number of fetches and timers still waiting on the host.
    #[cfg(test)]
    pub(crate) fn pending_callbacks(&self) -> usize {
        self.bridge.pending_callbacks()
    }

    fn evaluate(&mut self, source: String) -> ExtensionResult<()> {
        self.deadline.arm(self.execution_timeout);

        let deadline = &*self.deadline;
        let timeout = self.execution_timeout;
        let result = self.context.with(|ctx| {
            ctx.eval::<Value, _>(source)
                .catch(&ctx)
                .map(drop)
                .map_err(|e| caught_error(e, deadline, timeout))
        });

        self.drain_jobs();
        self.deadline.disarm();
        result
    }

    fn probe_methods(&mut self) -> ExtensionResult<()> {
        self.methods = self.context.with(|ctx| -> rquickjs::Result<_> {
            let globals = ctx.globals();
            let mut methods = HashMap::new();
            for method in GuestMethod::ALL {
                let value: Value = globals.get(method.function_name())?;
                if let Some(function) = value.into_function() {
                    methods.insert(method, Persistent::save(&ctx, function));
                }
            }
            Ok(methods)
        })?;
        Ok(())
    }

    fn drain_jobs(&self) {
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => {}
                Ok(false) => break,
                Err(_) => {
                    tracing::warn!(
                        extension = %self.bridge.label(),
                        "Unhandled error in a guest promise job"
                    );
                }
            }
        }
    }

    fn fail(&mut self, error: ExtensionError) -> ExtensionError {
        tracing::debug!(
            origin = %self.bridge.origin(),
            error = %error,
            "Extension initialization failed"
        );
        self.state = IsolateState::Failed {
            message: error.to_string(),
        };
        error
    }
}

impl Drop for ExtensionIsolate {
    fn drop(&mut self) {
        // Engine handles must be released before the runtime frees its heap.
        self.methods.clear();
        self.bridge.clear_callbacks();
    }
}

fn call_function<'js>(
    function: &Function<'js>,
    args: Vec<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let mut args = args.into_iter();
    match (args.next(), args.next(), args.next(), args.next()) {
        (None, ..) => function.call(()),
        (Some(a), None, ..) => function.call((a,)),
        (Some(a), Some(b), None, _) => function.call((a, b)),
        (Some(a), Some(b), Some(c), None) => function.call((a, b, c)),
        (Some(a), Some(b), Some(c), Some(d)) => function.call((a, b, c, d)),
    }
}

fn thenable<'js>(value: &Value<'js>) -> Option<Function<'js>> {
    value.as_object()?.get::<_, Function>("then").ok()
}

fn caught_error(error: CaughtError<'_>, deadline: &Deadline, timeout: Duration) -> ExtensionError {
    if deadline.take_tripped() {
        return ExtensionError::ExecutionTimeout(timeout);
    }
    match error {
        CaughtError::Exception(exception) => ExtensionError::Guest {
            message: exception
                .message()
                .unwrap_or_else(|| "uncaught exception".to_string()),
            stack: exception.stack(),
        },
        CaughtError::Value(value) => rejection_error(Some(&value)),
        CaughtError::Error(error) => ExtensionError::from(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::callback::CallbackAdapter;
    use crate::extensions::ipc::HttpBridge;
    use crate::extensions::Features;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        _runtime: tokio::runtime::Runtime,
        request: LoadRequest,
    }

    fn fixture(source: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let http = HttpBridge::new(reqwest::Client::new(), runtime.handle().clone());
        let request = LoadRequest {
            source: source.to_string(),
            origin: "test.js".to_string(),
            data_dir: dir.path().to_path_buf(),
            memory_limit: 32 * 1024 * 1024,
            max_stack_size: 512 * 1024,
            execution_timeout: Duration::from_millis(200),
            http,
        };
        Fixture {
            _dir: dir,
            _runtime: runtime,
            request,
        }
    }

    fn load(source: &str) -> (Fixture, ExtensionResult<(ExtensionIsolate, LoadedInstance)>) {
        let fixture = fixture(source);
        let result = ExtensionIsolate::load(fixture.request.clone(), WeakQueue::detached());
        (fixture, result)
    }

    const DEMO: &str = r#"
        Awery.setManifest({
            id: "demo", version: "1.0", features: ["search_media", "account_login"]
        });
        function awerySearchMedia(filters, callback) {
            callback.resolve([{ id: "1", title: filters[0].value }]);
        }
        function aweryIsLoggedIn() { return true; }
        function aweryLogin(params) { throw new Error("bad password"); }
        async function aweryLoginScreen() { return { username: "text" }; }
        function aweryLogOut(callback) { while (true) {} }
    "#;

    fn call<T: Send + 'static>(
        isolate: &mut ExtensionIsolate,
        method: GuestMethod,
        args: Vec<GuestValue>,
        decode: impl FnOnce(GuestValue) -> ExtensionResult<T> + Send + 'static,
    ) -> ExtensionResult<T> {
        let (adapter, mut pending) = CallbackAdapter::new("demo", method.function_name(), decode);
        isolate.run(Box::new(move |isolate: &mut ExtensionIsolate| {
            isolate.invoke(method, args, adapter)
        }));
        pending.try_take().expect("call should have settled")
    }

    #[test]
    fn test_load_builds_capability_table() {
        let (_fixture, result) = load(DEMO);
        let (isolate, loaded) = result.unwrap();

        assert_eq!(isolate.state(), &IsolateState::Ready);
        assert_eq!(loaded.manifest.id, "demo");
        assert_eq!(
            loaded.manifest.features,
            Features::SEARCH_MEDIA | Features::ACCOUNT_LOGIN
        );
        assert!(loaded.methods.contains(&GuestMethod::SearchMedia));
        assert!(!loaded.methods.contains(&GuestMethod::MediaVideos));
    }

    #[test]
    fn test_missing_manifest() {
        let (_fixture, result) = load("function awerySearchMedia() {}");
        assert!(matches!(
            result.err(),
            Some(ExtensionError::Configuration { .. })
        ));
    }

    #[test]
    fn test_invalid_manifest_wins_over_script_error() {
        let (_fixture, result) = load(r#"Awery.setManifest({ id: "demo" });"#);
        let err = result.err().unwrap();
        assert!(err.to_string().contains("manifest.version"), "{err}");
    }

    #[test]
    fn test_second_manifest_call_throws() {
        let (_fixture, result) = load(
            r#"
            Awery.setManifest({ id: "demo", version: "1" });
            Awery.setManifest({ id: "other", version: "1" });
            "#,
        );
        assert!(matches!(result.err(), Some(ExtensionError::LoadFailed { .. })));
    }

    #[test]
    fn test_script_error_is_load_failure() {
        let (_fixture, result) = load("throw new Error('boom')");
        let err = result.err().unwrap();
        assert!(matches!(err, ExtensionError::LoadFailed { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_invoke_paths() {
        let (_fixture, result) = load(DEMO);
        let (mut isolate, _) = result.unwrap();

        let filters = GuestValue::from(vec![GuestValue::mapping().with("value", "naruto")]);
        let found = call(&mut isolate, GuestMethod::SearchMedia, vec![filters], Ok).unwrap();
        assert_eq!(found.as_sequence().unwrap()[0].get("title").as_str(), Some("naruto"));

        let logged_in = call(&mut isolate, GuestMethod::IsLoggedIn, vec![], |v| Ok(v.is_truthy()));
        assert!(logged_in.unwrap());

        let screen = call(&mut isolate, GuestMethod::LoginScreen, vec![], Ok).unwrap();
        assert_eq!(screen.get("username").as_str(), Some("text"));

        let args = vec![GuestValue::mapping()];
        let err = call(&mut isolate, GuestMethod::Login, args, Ok).unwrap_err();
        assert!(matches!(&err, ExtensionError::Guest { message, .. } if message == "bad password"));

        let err = call(&mut isolate, GuestMethod::MediaVideos, vec![], Ok).unwrap_err();
        assert_eq!(err.to_string(), "aweryMediaVideos is not a function or isn't defined");
    }

    #[test]
    fn test_runaway_script_times_out_and_isolate_survives() {
        let (_fixture, result) = load(DEMO);
        let (mut isolate, _) = result.unwrap();

        let err = call(&mut isolate, GuestMethod::LogOut, vec![], Ok).unwrap_err();
        assert!(matches!(err, ExtensionError::ExecutionTimeout(_)));

        let logged_in = call(&mut isolate, GuestMethod::IsLoggedIn, vec![], |v| Ok(v.is_truthy()));
        assert!(logged_in.unwrap());
    }

    #[test]
    fn test_only_ready_isolates_run_calls() {
        let (_fixture, result) = load(DEMO);
        let (mut isolate, _) = result.unwrap();
        isolate.fail(ExtensionError::Cancelled);
        assert!(matches!(isolate.state(), IsolateState::Failed { .. }));

        let err = call(&mut isolate, GuestMethod::IsLoggedIn, vec![], |v| Ok(v.is_truthy()));
        assert!(matches!(err, Err(ExtensionError::Uninstalled(ext)) if ext == "demo"));
    }

    #[test]
    fn test_storage_and_settings_surface() {
        let (_fixture, result) = load(
            r#"
            Awery.setManifest({
                id: "demo", version: "1",
                settings: [{ key: "quality", type: "string", value: "720p" }]
            });
            Awery.setString("quality", "1080p");
            Awery.setInteger("page", 3);
            Awery.addSetting({ key: "nsfw", type: "boolean", value: false });
            if (Awery.getInteger("page") !== 3) throw new Error("page");
            if (Awery.getBoolean("page") !== null) throw new Error("typed read");
            if (Awery.getString("missing", "x") !== "x") throw new Error("default");
            "#,
        );
        let (_isolate, loaded) = result.unwrap();

        let tree = loaded.settings.lock().unwrap();
        let quality = tree.find_full_key("quality").unwrap();
        assert_eq!(
            tree.node(quality).unwrap().value,
            Some(crate::extensions::settings::SettingValue::String("1080p".to_string()))
        );
        assert!(tree.find_full_key("nsfw").is_some());
    }

    #[test]
    fn test_cleared_timers_are_forgotten() {
        let (_fixture, result) = load(
            r#"
            Awery.setManifest({ id: "demo", version: "1" });
            var kept = Awery.setTimeout(function () {}, 1000);
            var dropped = Awery.setTimeout(function () {}, 1000);
            Awery.clearTimeout(dropped);
            "#,
        );
        let (isolate, _loaded) = result.unwrap();
        assert_eq!(isolate.pending_callbacks(), 1);
    }
}
