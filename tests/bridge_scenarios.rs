//! End-to-end scenarios against real provider scripts.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use awery_bridge::extensions::{
    ActionOutcome, ExtensionError, ExtensionHostConfig, ExtensionManager, Features, GuestMethod,
    HostAction, SettingValue, SettingsEvent,
};
use awery_bridge::models::{
    CatalogEpisode, CatalogFilter, CatalogMedia, TrackingFeatures, TrackingOptions,
};
use tempfile::TempDir;

fn manager(dir: &TempDir) -> ExtensionManager {
    let config = ExtensionHostConfig {
        extensions_dir: dir.path().join("extensions"),
        data_dir: dir.path().join("data"),
        execution_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    ExtensionManager::new(config).unwrap()
}

#[test]
fn missing_search_function_is_unimplemented() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let provider = manager
        .install(
            r#"Awery.setManifest({ id: "demo", version: "1.0", features: ["media_search"] });"#,
            "demo.js",
        )
        .unwrap();

    assert!(!provider.implements(GuestMethod::SearchMedia));
    let err = provider
        .search_media(&[CatalogFilter::query("x")])
        .wait()
        .unwrap_err();
    match err {
        ExtensionError::Unimplemented { function, .. } => assert_eq!(function, "awerySearchMedia"),
        other => panic!("unexpected error: {other}"),
    }

    // The instance keeps working after the failed call.
    assert!(manager.get_extension("demo").is_some());
    assert!(!provider.is_stopped());
}

#[test]
fn invalid_episode_is_dropped() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let provider = manager
        .install(
            r#"
            Awery.setManifest({ id: "eps", version: "1", features: ["media_watch"] });
            function aweryMediaEpisodes(page, media, callback) {
                callback.resolve([
                    { number: 1 },
                    { title: "Episode 2", url: "https://example.org/2", number: 2 },
                ]);
            }
            "#,
            "eps.js",
        )
        .unwrap();

    let episodes: Vec<CatalogEpisode> = provider
        .episodes(0, &CatalogMedia::new("m1", "Media"))
        .wait()
        .unwrap();
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0].title, "Episode 2");
    assert_eq!(episodes[0].number, Some(2.0));
}

#[test]
fn empty_search_is_zero_results() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let provider = manager
        .install(
            r#"
            Awery.setManifest({ id: "empty", version: "1", features: ["search_media"] });
            function awerySearchMedia(filters, callback) {
                callback.resolve({ items: [{ poster: "no-id.jpg" }], hasNextPage: false });
            }
            "#,
            "empty.js",
        )
        .unwrap();

    let err = provider.search_media(&[]).wait().unwrap_err();
    assert!(err.is_zero_results());
    assert_eq!(err.to_string(), "No media found");
}

#[test]
fn search_results_carry_source() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let provider = manager
        .install(
            r#"
            Awery.setManifest({ id: "src", version: "1", features: ["search_media"] });
            function awerySearchMedia(filters, callback) {
                var query = filters.filter(function (f) { return f.id === "query"; })[0];
                callback.resolve({
                    items: [{ id: "7", title: query.value }],
                    hasNextPage: true,
                });
            }
            "#,
            "src.js",
        )
        .unwrap();

    let results = provider
        .search_media(&[CatalogFilter::query("frieren"), CatalogFilter::page(1)])
        .wait()
        .unwrap();
    assert!(results.has_next_page);
    assert_eq!(results.items[0].source, "src");
    assert_eq!(results.items[0].title(), Some("frieren"));
    assert_eq!(results.items[0].global_id().as_deref(), Some("src;;;7"));
}

#[test]
fn missing_manifest_is_never_registered() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);

    let err = manager
        .install("function awerySearchMedia(f, cb) { cb.resolve([]); }", "nomanifest.js")
        .unwrap_err();
    assert!(matches!(err, ExtensionError::Configuration { .. }));

    let err = manager
        .install(r#"Awery.setManifest({ version: "1" });"#, "noid.js")
        .unwrap_err();
    assert!(matches!(err, ExtensionError::Configuration { .. }));

    assert!(manager.get_all_extensions().is_empty());
}

#[test]
fn unknown_features_are_ignored() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let provider = manager
        .install(
            r#"Awery.setManifest({
                id: "fwd",
                version: "2",
                features: ["media_search", "totally_unknown_flag"],
            });"#,
            "fwd.js",
        )
        .unwrap();

    assert_eq!(provider.features(), Features::SEARCH_MEDIA);
    assert_eq!(provider.name(), "fwd");
    assert_eq!(provider.declared_features().len(), 2);
}

#[test]
fn undeclared_feature_is_not_dispatched() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let provider = manager
        .install(
            r#"
            Awery.setManifest({ id: "nofeat", version: "1", features: ["search_media"] });
            var called = false;
            function aweryMediaVideos(episode, callback) {
                called = true;
                callback.resolve([{ url: "https://example.org/v.mp4" }]);
            }
            "#,
            "nofeat.js",
        )
        .unwrap();

    let episode = CatalogEpisode::new("E1", "https://example.org/1");
    let err = provider.videos(&episode).wait().unwrap_err();
    assert!(matches!(err, ExtensionError::FeatureNotDeclared { .. }));
    assert!(err.is_host_misuse());
}

#[test]
fn dispatch_is_fifo_settlement_is_not() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let provider = manager
        .install(
            r#"
            Awery.setManifest({ id: "order", version: "1", features: ["search_media"] });
            var started = [];
            function awerySearchMedia(filters, callback) {
                var name = filters[0].value;
                started.push(name);
                var result = [{ id: name, title: started.join(",") }];
                if (name === "A") {
                    setTimeout(function () { callback.resolve(result); }, 300);
                } else {
                    callback.resolve(result);
                }
            }
            "#,
            "order.js",
        )
        .unwrap();

    let mut first = provider.search_media(&[CatalogFilter::query("A")]);
    let second = provider.search_media(&[CatalogFilter::query("B")]);

    let b = second.wait().unwrap();
    assert_eq!(b.items[0].title(), Some("A,B"));
    assert!(first.try_take().is_none());

    let a = first.wait().unwrap();
    assert_eq!(a.items[0].title(), Some("A"));
}

#[test]
fn guest_exception_is_per_call() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let provider = manager
        .install(
            r#"
            Awery.setManifest({ id: "throws", version: "1", features: ["search_media"] });
            var calls = 0;
            function awerySearchMedia(filters, callback) {
                calls++;
                if (calls === 1) throw new Error("rate limited");
                callback.reject({ message: "upstream down" });
            }
            "#,
            "throws.js",
        )
        .unwrap();

    let err = provider.search_media(&[]).wait().unwrap_err();
    assert!(err.is_guest_error());
    assert!(err.to_string().contains("rate limited"));

    let err = provider.search_media(&[]).wait().unwrap_err();
    assert!(err.to_string().contains("upstream down"));
}

#[test]
fn tracking_ignores_unsupported_fields() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let provider = manager
        .install(
            r#"
            Awery.setManifest({ id: "track", version: "1", features: ["account_track"] });
            function aweryTrackMedia(media, options, callback) {
                callback.resolve({
                    id: "t1",
                    progress: 5,
                    score: 8.5,
                    lists: [{ id: "w", title: "Watching" }],
                });
            }
            "#,
            "track.js",
        )
        .unwrap();

    let options = TrackingOptions::new(TrackingFeatures::PROGRESS | TrackingFeatures::SCORE);
    let tracked = provider
        .track_media(&CatalogMedia::new("m", "Media"), Some(&options))
        .wait()
        .unwrap();
    assert_eq!(tracked.progress, Some(5.0));
    assert_eq!(tracked.score, Some(8.5));
    assert!(tracked.lists.is_empty());
}

#[test]
fn tracking_response_cannot_widen_requested_fields() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let provider = manager
        .install(
            r#"
            Awery.setManifest({ id: "widen", version: "1", features: ["account_track"] });
            function aweryTrackMedia(media, options, callback) {
                callback.resolve({
                    id: "t1",
                    features: ["progress", "score", "lists"],
                    progress: 5,
                    score: 8.5,
                    lists: [{ id: "w", title: "Watching" }],
                });
            }
            "#,
            "widen.js",
        )
        .unwrap();
    let media = CatalogMedia::new("m", "Media");

    let options = TrackingOptions::new(TrackingFeatures::PROGRESS | TrackingFeatures::SCORE);
    let tracked = provider.track_media(&media, Some(&options)).wait().unwrap();
    assert_eq!(tracked.features, TrackingFeatures::PROGRESS | TrackingFeatures::SCORE);
    assert_eq!(tracked.progress, Some(5.0));
    assert!(tracked.lists.is_empty());

    let fetched = provider.track_media(&media, None).wait().unwrap();
    assert!(fetched.features.contains(TrackingFeatures::LISTS));
    assert_eq!(fetched.lists.len(), 1);
    assert_eq!(fetched.lists[0].title, "Watching");
}

#[test]
fn cancelled_call_reports_cancelled() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let provider = manager
        .install(
            r#"
            Awery.setManifest({ id: "slow", version: "1", features: ["search_media"] });
            function awerySearchMedia(filters, callback) {
                setTimeout(function () {
                    if (!callback.isCancelled()) callback.resolve([{ id: "1", title: "late" }]);
                }, 200);
            }
            "#,
            "slow.js",
        )
        .unwrap();

    let call = provider.search_media(&[]);
    call.cancel();
    assert!(matches!(call.wait(), Err(ExtensionError::Cancelled)));
}

#[test]
fn login_flow_updates_actions() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    manager
        .install(
            r#"
            Awery.setManifest({ id: "acct", version: "1", features: ["account_login"] });
            var loggedIn = false;
            function aweryIsLoggedIn() { return loggedIn; }
            function aweryLoginScreen(callback) {
                callback.resolve({ username: "text", password: "password" });
            }
            function aweryLogin(params, callback) {
                loggedIn = params.username === "frieren" && params.password === "zoltraak";
                callback.resolve(loggedIn);
            }
            function aweryLogOut(callback) {
                loggedIn = false;
                callback.resolve();
            }
            "#,
            "acct.js",
        )
        .unwrap();

    let settings = manager.settings("acct").unwrap();
    let has_action = |action: HostAction| {
        settings
            .lock()
            .unwrap()
            .action_node(|candidate| candidate == action)
            .is_some()
    };
    assert!(has_action(HostAction::Login));
    assert!(has_action(HostAction::Uninstall));

    let screen = match manager.run_action("acct", HostAction::Login).unwrap() {
        ActionOutcome::LoginRequired(screen) => screen,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(screen.len(), 2);

    let provider = manager.get_extension("acct").unwrap();
    let mut answers = screen.clone();
    answers.insert("username".to_string(), "frieren".to_string());
    answers.insert("password".to_string(), "zoltraak".to_string());
    assert!(provider.complete_login(&answers).unwrap());
    assert!(has_action(HostAction::LogOut));
    assert!(!has_action(HostAction::Login));

    assert_eq!(
        manager.run_action("acct", HostAction::LogOut).unwrap(),
        ActionOutcome::LoggedOut
    );
    assert!(has_action(HostAction::Login));
}

#[test]
fn settings_persist_across_reinstall() {
    let dir = TempDir::new().unwrap();
    let source = r#"
        Awery.setManifest({
            id: "prefs",
            version: "1",
            settings: [{ key: "quality", type: "select", title: "Quality", value: "720p" }],
        });
    "#;

    {
        let manager = manager(&dir);
        let provider = manager.install(source, "prefs.js").unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        provider.settings().unwrap().lock().unwrap().add_listener(move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        let key = "quality";
        provider
            .set_setting_value(key, SettingValue::String("1080p".to_string()))
            .unwrap();
        assert!(matches!(
            events.lock().unwrap().as_slice(),
            [SettingsEvent::Changed { .. }]
        ));
    }

    let manager = manager(&dir);
    let provider = manager.install(source, "prefs.js").unwrap();
    assert_eq!(
        provider.setting_value("quality"),
        Some(SettingValue::String("1080p".to_string()))
    );
}

#[test]
fn uninstall_abandons_queued_calls() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let provider = manager
        .install(
            r#"
            Awery.setManifest({ id: "gone", version: "1", features: ["search_media"] });
            function awerySearchMedia(filters, callback) {
                setTimeout(function () { callback.resolve([{ id: "1", title: "t" }]); }, 500);
            }
            "#,
            "gone.js",
        )
        .unwrap();

    let pending = provider.search_media(&[]);
    manager.uninstall("gone").unwrap();
    assert!(manager.get_extension("gone").is_none());

    let err = pending.wait().unwrap_err();
    assert!(matches!(err, ExtensionError::Abandoned(_)));

    let err = provider.search_media(&[]).wait().unwrap_err();
    assert!(matches!(
        err,
        ExtensionError::Uninstalled(_) | ExtensionError::Abandoned(_)
    ));
}
