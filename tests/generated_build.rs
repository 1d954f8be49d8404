// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Builds and runs a generated crate with cargo.
//!
//! Run with: `cargo test --test generated_build -- --ignored`

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;
use traceweave::generator::{GenerateOptions, Generator};

const MAIN: &str = r#"mod app;
mod services;
mod shop;

use tracing_subscriber::fmt::format::FmtSpan;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stdout)
        .with_ansi(false)
        .without_time()
        .init();

    let mut services = services::Services::default();
    app::configure(&mut services);
    let Some(orders) = services.get::<dyn shop::Orders>() else {
        panic!("orders not registered");
    };
    println!("placed {}", orders.place(21));
    println!("count {}", orders.count());
    app::run(&*orders);
}
"#;

const SERVICES: &str = r#"use std::any::{Any, TypeId};
use std::collections::HashMap;

type Factory<S> = Box<dyn Fn(&Services) -> Box<S>>;

#[derive(Default)]
pub struct Services {
    factories: HashMap<TypeId, Box<dyn Any>>,
}

impl Services {
    pub fn add_singleton_factory<S: ?Sized + 'static>(&mut self, factory: impl Fn(&Services) -> Box<S> + 'static) {
        let factory: Factory<S> = Box::new(factory);
        self.factories.insert(TypeId::of::<S>(), Box::new(factory));
    }

    pub fn get<S: ?Sized + 'static>(&self) -> Option<Box<S>> {
        let factory = self.factories.get(&TypeId::of::<S>())?.downcast_ref::<Factory<S>>()?;
        Some(factory(self))
    }
}
"#;

const SHOP: &str = r#"use traceweave::traced;

#[traced]
pub trait Orders {
    fn place(&self, id: u64) -> u64;
    #[traced(skip)]
    fn count(&self) -> usize;
}

pub struct OrderBook;

impl Orders for OrderBook {
    fn place(&self, id: u64) -> u64 {
        id * 2
    }

    fn count(&self) -> usize {
        3
    }
}
"#;

const APP: &str = r#"use crate::services::Services;
use crate::shop::{OrderBook, Orders};

fn build_orders(_: &Services) -> Box<dyn Orders> {
    Box::new(OrderBook)
}

pub fn configure(services: &mut Services) {
    services.add_singleton_factory::<dyn Orders>(build_orders);
}

pub fn run(orders: &dyn Orders) {
    println!("placed {}", orders.place(2));
}
"#;

fn fixture() -> TempDir {
    let temp = TempDir::new().unwrap();
    let traceweave = env!("CARGO_MANIFEST_DIR").replace('\\', "/");
    let manifest = format!(
        "[package]\nname = \"shop\"\nversion = \"1.4.0\"\nedition = \"2021\"\n\n\
         [dependencies]\ntraceweave = {{ path = \"{}\" }}\ntracing = \"0.1\"\ntracing-subscriber = \"0.3\"\n",
        traceweave
    );
    for (path, content) in [
        ("Cargo.toml", manifest.as_str()),
        ("src/main.rs", MAIN),
        ("src/services.rs", SERVICES),
        ("src/shop.rs", SHOP),
        ("src/app.rs", APP),
    ] {
        let full = temp.path().join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }
    temp
}

fn cargo_run(dir: &Path) -> String {
    let cargo = std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    let output = Command::new(cargo)
        .args(["run", "--quiet"])
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "cargo run failed in {}:\n{}",
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

#[tokio::test]
#[ignore = "invokes cargo and fetches tracing-subscriber"]
async fn test_generated_crate_builds_and_traces_each_call_once() {
    let temp = fixture();

    // the markers alone change nothing
    let plain = cargo_run(temp.path());
    assert!(plain.contains("placed 42\ncount 3\nplaced 4\n"));
    assert!(!plain.contains("Orders.place"));

    let report = Generator::new(GenerateOptions::new(temp.path())).run().await.unwrap();
    assert_eq!(report.registrations_patched, 1);
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);

    let traced = cargo_run(&temp.path().join("target/traceweave"));
    assert!(traced.contains("placed 42"));
    assert!(traced.contains("count 3"));
    assert!(traced.contains("placed 4"));
    // two place calls, one closed span each; count is skipped
    assert_eq!(traced.matches("Orders.place").count(), 2, "{}", traced);
    assert!(!traced.contains("Orders.count"));
}
