use config::FileFormat;

use super::*;

fn raw_site(base_url: &str) -> RawSiteSettings {
    RawSiteSettings {
        base_url: Some(base_url.to_string()),
        locales: Some(vec!["nl".to_string()]),
        schedule: Some("0 0 3 * * *".to_string()),
        membership: None,
        sections: None,
    }
}

fn raw_with_site() -> RawSettings {
    let mut raw = RawSettings::default();
    raw.sites
        .insert("am".to_string(), raw_site("https://am.example.org/"));
    raw
}

fn raw_from_toml(source: &str) -> RawSettings {
    Config::builder()
        .add_source(File::from_str(source, FileFormat::Toml))
        .build()
        .expect("config builds")
        .try_deserialize()
        .expect("deserializes")
}

fn invalid_key(result: Result<Settings, LoadError>) -> String {
    match result {
        Err(LoadError::Invalid { key, .. }) => key,
        other => panic!("expected invalid configuration, got {other:?}"),
    }
}

#[test]
fn defaults_apply_when_only_sites_are_configured() {
    let settings = Settings::from_raw(raw_with_site()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.database.max_connections.get(), 8);
    assert_eq!(settings.storage.directory, PathBuf::from("artifacts"));
    assert_eq!(settings.sitemap.pointer_ttl, Duration::from_secs(259_200));
    assert_eq!(settings.sitemap.lease_ttl, Duration::from_secs(600));
    assert!(settings.sitemap.run_on_start);
    assert!(settings.sitemap.instance_id.is_none());
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = raw_with_site();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        run_on_start: Some(false),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(!settings.sitemap.run_on_start);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = raw_with_site();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn rebuild_overrides_replace_database_and_storage() {
    let mut raw = raw_with_site();
    let args = RebuildArgs {
        database: DatabaseOverride {
            database_url: Some("postgres://override".to_string()),
        },
        storage_directory: Some(PathBuf::from("/var/lib/sitemapd")),
        site: "am".to_string(),
    };

    raw.apply_rebuild_overrides(&args);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.database.url.as_deref(), Some("postgres://override"));
    assert_eq!(
        settings.storage.directory,
        PathBuf::from("/var/lib/sitemapd")
    );
}

#[test]
fn base_url_trailing_slash_is_trimmed() {
    let settings = Settings::from_raw(raw_with_site()).expect("valid settings");
    let profile = settings.sites.get("am").expect("site registered");

    assert_eq!(profile.base_url, "https://am.example.org");
    assert_eq!(profile.locales, ["nl"]);
    assert_eq!(profile.sections, SectionPlan::default());
}

#[test]
fn rejects_an_empty_site_list() {
    assert_eq!(
        invalid_key(Settings::from_raw(RawSettings::default())),
        "sites"
    );
}

#[test]
fn rejects_malformed_site_entries() {
    let mut raw = RawSettings::default();
    raw.sites
        .insert("am".to_string(), raw_site("ftp://am.example.org"));
    assert_eq!(
        invalid_key(Settings::from_raw(raw)),
        "sites.am.base_url"
    );

    let mut raw = RawSettings::default();
    let mut site = raw_site("https://am.example.org");
    site.schedule = Some("nightly".to_string());
    raw.sites.insert("am".to_string(), site);
    assert_eq!(invalid_key(Settings::from_raw(raw)), "sites.am.schedule");

    let mut raw = RawSettings::default();
    let mut site = raw_site("https://am.example.org");
    site.locales = Some(Vec::new());
    raw.sites.insert("am".to_string(), site);
    assert_eq!(invalid_key(Settings::from_raw(raw)), "sites.am.locales");

    let mut raw = RawSettings::default();
    raw.sites
        .insert("A/M".to_string(), raw_site("https://am.example.org"));
    assert_eq!(invalid_key(Settings::from_raw(raw)), "sites.A/M");
}

#[test]
fn zero_lease_ttl_is_rejected() {
    let mut raw = raw_with_site();
    raw.sitemap.lease_ttl_seconds = Some(0);
    assert_eq!(
        invalid_key(Settings::from_raw(raw)),
        "sitemap.lease_ttl_seconds"
    );
}

#[test]
fn oversized_ttls_are_rejected() {
    let mut raw = raw_with_site();
    raw.sitemap.pointer_ttl_seconds = Some(u64::MAX);
    assert_eq!(
        invalid_key(Settings::from_raw(raw)),
        "sitemap.pointer_ttl_seconds"
    );

    let mut raw = raw_with_site();
    raw.sitemap.lease_ttl_seconds = Some(31_536_001);
    assert_eq!(
        invalid_key(Settings::from_raw(raw)),
        "sitemap.lease_ttl_seconds"
    );

    let mut raw = raw_with_site();
    raw.sitemap.lease_ttl_seconds = Some(31_536_000);
    let settings = Settings::from_raw(raw).expect("one year is accepted");
    assert_eq!(settings.sitemap.lease_ttl, Duration::from_secs(31_536_000));
}

#[test]
fn sites_and_section_plans_load_from_toml() {
    let raw = raw_from_toml(
        r#"
        [sitemap]
        instance_id = "node-a"

        [sites.am]
        base_url = "https://am.example.org"
        locales = ["nl", "en"]
        schedule = "0 0 3 * * *"
        membership = "am"

        [sites.dgv]
        base_url = "https://dgv.example.org"
        schedule = "0 30 3 * * *"

        [sites.dgv.sections]
        landing_pages = ["projecten"]

        [[sites.dgv.sections.main_pages]]
        slug = "home"
        paths = ["", "home"]
        "#,
    );

    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.sitemap.instance_id.as_deref(), Some("node-a"));
    let contexts: Vec<_> = settings
        .sites
        .contexts()
        .map(SiteContext::as_str)
        .collect();
    assert_eq!(contexts, ["am", "dgv"]);

    let am = settings.sites.get("am").expect("am");
    assert_eq!(am.membership.as_deref(), Some("am"));
    assert_eq!(am.locales, ["nl", "en"]);

    let dgv = settings.sites.get("dgv").expect("dgv");
    assert_eq!(dgv.locales, ["nl"]);
    assert_eq!(dgv.sections.landing_pages, ["projecten"]);
    assert_eq!(dgv.sections.main_pages.len(), 1);
    assert_eq!(dgv.sections.main_pages[0].paths, ["", "home"]);
    assert!(dgv.sections.collections.is_empty());
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["sitemapd"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_rebuild_arguments() {
    let args = CliArgs::parse_from([
        "sitemapd",
        "rebuild",
        "--database-url",
        "postgres://example",
        "dgv",
    ]);

    match args.command.expect("rebuild command") {
        Command::Rebuild(rebuild) => {
            assert_eq!(rebuild.site, "dgv");
            assert_eq!(
                rebuild.database.database_url.as_deref(),
                Some("postgres://example")
            );
            assert!(rebuild.storage_directory.is_none());
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "sitemapd",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--run-on-start",
        "false",
        "--storage-directory",
        "/srv/sitemaps",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.run_on_start, Some(false));
            assert_eq!(
                serve.overrides.storage_directory,
                Some(PathBuf::from("/srv/sitemaps"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}
