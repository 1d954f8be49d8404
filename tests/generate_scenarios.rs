// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end generation over small projects on disk.

use std::path::Path;

use tempfile::TempDir;
use traceweave::generator::{GenerateOptions, Generator, INTERCEPTIONS_FILE};
use traceweave::model::InstrumentationMode;
use traceweave::synth::InterceptionTable;
use traceweave::DiagnosticKind;

const MANIFEST: &str = "[package]\nname = \"shop\"\nversion = \"1.4.0\"\n";

const SHOP: &str = r#"pub struct OrderId(pub u64);

#[traced]
pub trait Orders: Send + Sync {
    fn place(&self, id: OrderId) -> Result<(), String>;
}
"#;

const DECORATED: &str = "crate::traced::decorators::shop_Orders::OrdersTraced";

fn project(files: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "Cargo.toml", MANIFEST);
    for (path, content) in files {
        write(temp.path(), path, content);
    }
    temp
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn output(root: &Path, relative: &str) -> String {
    std::fs::read_to_string(root.join("target/traceweave").join(relative)).unwrap()
}

async fn generate(root: &Path) -> traceweave::GenerationReport {
    Generator::new(GenerateOptions::new(root)).run().await.unwrap()
}

async fn generate_intercepting(root: &Path) -> traceweave::GenerationReport {
    let mut options = GenerateOptions::new(root);
    options.synth.mode = InstrumentationMode::Intercept;
    Generator::new(options).run().await.unwrap()
}

#[tokio::test]
async fn test_factory_registration_gets_one_decorator() {
    let app = "use crate::shop::Orders;\n\npub fn configure(services: &mut Services) {\n    services.add_singleton_factory::<dyn Orders>(build_orders);\n}\n";
    let temp = project(&[
        ("src/lib.rs", "pub mod app;\npub mod shop;\n"),
        ("src/shop.rs", SHOP),
        ("src/app.rs", app),
    ]);

    let report = generate(temp.path()).await;
    assert_eq!(report.interfaces, 1);
    assert_eq!(report.decorators, 1);
    assert_eq!(report.registrations, 1);
    assert_eq!(report.registrations_patched, 1);
    assert!(report.diagnostics.is_empty());

    let patched = output(temp.path(), "src/app.rs");
    assert!(patched.contains(&format!(
        "services.add_singleton_factory::<dyn Orders>({{ let __factory = build_orders; move |__r| {{ let inner: Box<dyn Orders> = (__factory)(__r); if crate::traced::registrations::enabled() {{ let inner: Box<dyn Orders> = Box::new({}::new(inner)); inner }} else {{ inner }} }} }});",
        DECORATED
    )));
    assert_eq!(patched.matches("::new(inner)").count(), 1);

    let decorators = output(temp.path(), "src/traced/decorators.rs");
    assert!(decorators.contains("let _span = TRACER.start_span(\"Orders.place\");"));
    assert_eq!(decorators.matches("start_span").count(), 1);

    let tracer = output(temp.path(), "src/traced/tracer.rs");
    assert!(tracer.contains("\"shop\""));
    assert!(tracer.contains("\"1.4.0\""));
}

#[tokio::test]
async fn test_decorator_chain_follows_declaration_order() {
    let app = "pub fn configure(services: &mut Services) {\n    services.add_singleton_factory::<dyn crate::shop::Orders>(build_orders);\n}\n";
    let temp = project(&[
        ("src/lib.rs", "pub mod app;\npub mod audit;\npub mod retry;\npub mod shop;\n"),
        ("src/shop.rs", SHOP),
        ("src/app.rs", app),
        (
            "src/retry.rs",
            "#[decorates(crate::shop::Orders)]\npub struct RetryOrders {\n    inner: Box<dyn crate::shop::Orders>,\n}\n",
        ),
        (
            "src/audit.rs",
            "#[decorates(crate::shop::Orders)]\npub struct AuditOrders {\n    inner: Box<dyn crate::shop::Orders>,\n}\n",
        ),
    ]);

    let report = generate(temp.path()).await;
    assert_eq!(report.registrations_patched, 1);

    // innermost first: src/audit.rs, src/retry.rs, src/shop.rs
    let patched = output(temp.path(), "src/app.rs");
    let audit = patched.find("crate::audit::AuditOrders::new(inner)").unwrap();
    let retry = patched.find("crate::retry::RetryOrders::new(inner)").unwrap();
    let traced = patched.find(&format!("{}::new(inner)", DECORATED)).unwrap();
    assert!(audit < retry);
    assert!(retry < traced);

    let table = output(temp.path(), "src/traced/registrations.rs");
    assert!(table.contains(&format!(
        "(\"crate::shop::Orders\", &[\"crate::audit::AuditOrders\", \"crate::retry::RetryOrders\", \"{}\"]),",
        DECORATED
    )));
}

#[tokio::test]
async fn test_call_site_is_keyed_by_exact_coordinate() {
    let mut app = String::from("use crate::repo::Repo;\n\npub fn run(repo: &dyn Repo, item: u32) {\n");
    for step in 4..42 {
        app.push_str(&format!("    // step {}\n", step));
    }
    app.push_str("    repo.save(item);\n}\n");
    assert_eq!(app.lines().position(|l| l.contains("repo.save")), Some(41));

    let temp = project(&[
        ("src/lib.rs", "pub mod app;\npub mod repo;\n"),
        ("src/repo.rs", "#[traced]\npub trait Repo {\n    fn save(&self, item: u32) -> bool;\n}\n"),
        ("src/app.rs", &app),
    ]);

    let report = generate_intercepting(temp.path()).await;
    assert_eq!(report.interceptions, 1);
    assert_eq!(report.decorators, 0);

    let table: InterceptionTable = serde_json::from_str(&output(temp.path(), INTERCEPTIONS_FILE)).unwrap();
    assert_eq!(table.entries.len(), 1);
    let entry = &table.entries[0];
    assert!(entry.file.ends_with("src/app.rs"));
    assert_eq!((entry.line, entry.column), (42, 10));
    assert_eq!(entry.interface, "crate::repo::Repo");
    assert_eq!(
        entry.interceptor,
        "crate::traced::interceptors::app::repo_Repo::RepoIntercepts::__traced_save_l42c10"
    );

    let rewritten = output(temp.path(), "src/app.rs");
    assert!(rewritten.contains("    repo.__traced_save_l42c10(item);\n"));
    assert!(rewritten.contains("use crate::traced::interceptors::app::repo_Repo::RepoIntercepts as _;"));

    let interceptors = output(temp.path(), "src/traced/interceptors.rs");
    assert!(interceptors.contains("fn __traced_save_l42c10(&self, __arg0: u32) -> bool"));
}

#[tokio::test]
async fn test_patching_keeps_lifetime_and_position() {
    let app = r#"use crate::shop::Orders;

pub fn configure(services: &mut Services) {
    services.add_singleton::<dyn Logger, StdoutLogger>();
    services.add_scoped::<dyn Orders, OrderBook>();
    services.add_transient_factory::<dyn Orders>(build_orders);
}
"#;
    let temp = project(&[
        ("src/lib.rs", "pub mod app;\npub mod shop;\n"),
        ("src/shop.rs", SHOP),
        ("src/app.rs", app),
    ]);

    let report = generate(temp.path()).await;
    assert_eq!(report.registrations, 3);
    assert_eq!(report.registrations_patched, 2);

    let patched = output(temp.path(), "src/app.rs");
    let logger = patched
        .find("    services.add_singleton::<dyn Logger, StdoutLogger>();\n")
        .unwrap();
    let scoped = patched
        .find("    services.add_scoped_factory::<dyn Orders>(|__r| { let inner: Box<dyn Orders> = Box::new(<OrderBook as crate::di::Activate>::activate(__r));")
        .unwrap();
    let transient = patched
        .find("    services.add_transient_factory::<dyn Orders>({ let __factory = build_orders;")
        .unwrap();
    assert!(logger < scoped);
    assert!(scoped < transient);

    let table = output(temp.path(), "src/traced/registrations.rs");
    assert!(table.contains("(1, \"crate::shop::Orders\", \"scoped\"),"));
    assert!(table.contains("(2, \"crate::shop::Orders\", \"transient\"),"));
    assert!(!table.contains("(0, "));
}

#[tokio::test]
async fn test_undetermined_registration_is_reported_and_left_alone() {
    let app = "pub fn configure(services: &mut Services) {\n    services.add_transient::<dyn crate::shop::Orders>();\n}\n";
    let temp = project(&[
        ("src/lib.rs", "pub mod app;\npub mod shop;\n"),
        ("src/shop.rs", SHOP),
        ("src/app.rs", app),
    ]);

    let report = generate(temp.path()).await;
    assert_eq!(report.registrations_patched, 0);
    assert_eq!(report.warnings(), 1);
    assert_eq!(report.diagnostics[0].kind, DiagnosticKind::AmbiguousConstruction);
    assert!(!report.is_failure(false));
    assert!(report.is_failure(true));

    assert_eq!(output(temp.path(), "src/app.rs"), app);
    // the decorator is still generated
    assert_eq!(report.decorators, 1);
}

#[tokio::test]
async fn test_output_is_byte_identical_across_runs() {
    let app = "use crate::shop::Orders;\n\npub fn run(orders: &dyn Orders) {\n    let _ = orders.place(crate::shop::OrderId(7));\n}\n\npub fn configure(services: &mut Services) {\n    services.add_singleton::<dyn Orders, OrderBook>();\n}\n";
    let temp = project(&[
        ("src/lib.rs", "pub mod app;\npub mod shop;\n"),
        ("src/shop.rs", SHOP),
        ("src/app.rs", app),
    ]);

    let files = [
        "src/lib.rs",
        "src/app.rs",
        "src/traced/mod.rs",
        "src/traced/tracer.rs",
        "src/traced/decorators.rs",
        "src/traced/registrations.rs",
        "src/traced/interceptors.rs",
        INTERCEPTIONS_FILE,
        "Cargo.toml",
    ];

    let first = generate(temp.path()).await;
    assert_eq!(first.files_cached, 0);
    let before: Vec<String> = files.iter().map(|f| output(temp.path(), f)).collect();

    let second = generate(temp.path()).await;
    assert_eq!(second.files_scanned, 0);
    assert_eq!(second.files_cached, first.files_scanned);
    let after: Vec<String> = files.iter().map(|f| output(temp.path(), f)).collect();

    assert_eq!(before, after);
    assert_eq!(first.files_written, second.files_written);
}

#[tokio::test]
async fn test_same_trait_name_in_nested_and_flat_modules() {
    let temp = project(&[
        ("src/lib.rs", "pub mod a;\npub mod a_b;\n"),
        ("src/a_b.rs", "#[traced]\npub trait C {\n    fn f(&self);\n}\n"),
        ("src/a/mod.rs", "pub mod b;\n"),
        ("src/a/b.rs", "#[traced]\npub trait C {\n    fn g(&self);\n}\n"),
    ]);

    let report = generate(temp.path()).await;
    assert_eq!(report.decorators, 2);

    let decorators = output(temp.path(), "src/traced/decorators.rs");
    assert!(decorators.contains("pub mod a_0b_C {"));
    assert!(decorators.contains("pub mod a_b_C {"));
    assert_eq!(decorators.matches("pub struct CTraced").count(), 2);
}

#[tokio::test]
async fn test_decorated_service_called_at_a_site_opens_one_span() {
    let app = "use crate::shop::Orders;\n\npub fn run(orders: &dyn Orders) {\n    let _ = orders.place(crate::shop::OrderId(7));\n}\n\npub fn configure(services: &mut Services) {\n    services.add_singleton::<dyn Orders, OrderBook>();\n}\n";
    let temp = project(&[
        ("src/lib.rs", "pub mod app;\npub mod shop;\n"),
        ("src/shop.rs", SHOP),
        ("src/app.rs", app),
    ]);

    let decorating = generate(temp.path()).await;
    assert_eq!((decorating.registrations_patched, decorating.interceptions), (1, 0));
    let patched = output(temp.path(), "src/app.rs");
    assert!(patched.contains("    let _ = orders.place(crate::shop::OrderId(7));\n"));

    let intercepting = generate_intercepting(temp.path()).await;
    assert_eq!((intercepting.registrations_patched, intercepting.interceptions), (0, 1));
    let redirected = output(temp.path(), "src/app.rs");
    assert!(redirected.contains("    services.add_singleton::<dyn Orders, OrderBook>();\n"));
    assert!(redirected.contains("orders.__traced_place_l4c20("));
}

#[tokio::test]
async fn test_mirror_has_no_marker_attributes() {
    let temp = project(&[
        ("src/lib.rs", "pub mod audit;\npub mod shop;\n"),
        ("src/shop.rs", SHOP),
        (
            "src/audit.rs",
            "#[decorates(crate::shop::Orders)]\npub struct AuditOrders {\n    inner: Box<dyn crate::shop::Orders>,\n}\n",
        ),
    ]);
    generate(temp.path()).await;

    for file in ["src/lib.rs", "src/shop.rs", "src/audit.rs"] {
        let mirrored = output(temp.path(), file);
        assert!(!mirrored.contains("#[traced"), "{}", file);
        assert!(!mirrored.contains("#[decorates"), "{}", file);
    }
    assert!(output(temp.path(), "src/shop.rs").starts_with("pub struct OrderId(pub u64);\n\npub trait Orders"));

    let manifest: toml::Table = output(temp.path(), "Cargo.toml").parse().unwrap();
    assert_eq!(manifest["package"]["name"].as_str(), Some("shop"));
    assert!(manifest.contains_key("workspace"));
}

#[tokio::test]
async fn test_dry_run_reports_without_writing() {
    let temp = project(&[("src/lib.rs", SHOP)]);
    let mut options = GenerateOptions::new(temp.path());
    options.dry_run = true;

    let report = Generator::new(options).run().await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.decorators, 1);
    assert!(report.files_written.contains(&INTERCEPTIONS_FILE.to_string()));
    assert!(!temp.path().join("target/traceweave").exists());
}

#[tokio::test]
async fn test_saved_graph_reproduces_generated_module() {
    let app = "use crate::shop::Orders;\n\npub fn configure(services: &mut Services) {\n    services.add_singleton_factory::<dyn Orders>(build_orders);\n}\n";
    let temp = project(&[
        ("src/lib.rs", "pub mod app;\npub mod shop;\n"),
        ("src/shop.rs", SHOP),
        ("src/app.rs", app),
    ]);

    let generator = Generator::new(GenerateOptions::new(temp.path()));
    let (graph, _) = generator.graph().await.unwrap();
    let facts = temp.path().join("graph.json");
    std::fs::write(&facts, serde_json::to_string_pretty(&graph).unwrap()).unwrap();
    generator.run().await.unwrap();

    let mut options = GenerateOptions::new(temp.path());
    options.out_dir = "target/replay".into();
    options.facts = Some(facts);
    let report = Generator::new(options).run().await.unwrap();
    assert_eq!(report.registrations_patched, 1);
    assert_eq!(report.files_scanned, 0);

    let replay = temp.path().join("target/replay");
    for file in ["src/app.rs", "src/lib.rs", "src/traced/decorators.rs", "src/traced/registrations.rs"] {
        assert_eq!(
            std::fs::read_to_string(replay.join(file)).unwrap(),
            output(temp.path(), file),
            "{} differs",
            file
        );
    }
    // only edited files and the crate root are mirrored
    assert!(!replay.join("src/shop.rs").exists());
}
