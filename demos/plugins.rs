//! Demonstrates plugin discovery and the default lookup.
//!
//! Plugins are declared with `inventory::submit!` anywhere in the binary.
//! `EntryPointLookup` collects the ones filed under a group, and the default
//! lookup proxies them unless one of them is itself a lookup.
//!
//! Run with: cargo run --example plugins

use sovran_lookup::{
    default_lookup, set_default_group, Entry, EntryPointLookup, Item, Lookup, LookupError,
    LookupExt, Plugin,
};
use std::sync::Arc;

trait Exporter: Send + Sync {
    fn format(&self) -> &'static str;
    fn export(&self, data: &[u32]) -> String;
}

struct CsvExporter;

impl Exporter for CsvExporter {
    fn format(&self) -> &'static str {
        "csv"
    }

    fn export(&self, data: &[u32]) -> String {
        data.iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

struct JsonExporter;

impl Exporter for JsonExporter {
    fn format(&self) -> &'static str {
        "json"
    }

    fn export(&self, data: &[u32]) -> String {
        format!("{:?}", data)
    }
}

fn csv() -> Item {
    Entry::lazy("csv", || {
        println!("  (loading csv exporter)");
        Ok(CsvExporter)
    })
    .provides(|e| e as Arc<dyn Exporter>)
    .with_display_name("Comma separated values")
    .into()
}

fn json() -> Item {
    Entry::lazy("json", || {
        println!("  (loading json exporter)");
        Ok(JsonExporter)
    })
    .provides(|e| e as Arc<dyn Exporter>)
    .with_display_name("JSON")
    .into()
}

sovran_lookup::inventory::submit! { Plugin::new("demo.exporters", "csv", csv) }
sovran_lookup::inventory::submit! { Plugin::new("demo.exporters", "json", json) }

fn main() -> Result<(), LookupError> {
    let exporters = EntryPointLookup::new("demo.exporters")?;

    // Declarations are visible before anything is loaded
    let result = exporters.lookup_result::<dyn Exporter>()?;
    for item in result.all_items()? {
        println!("found {} ({})", item.display_name(), item.id());
    }

    let data = [1, 2, 3];
    for exporter in exporters.lookup_all::<dyn Exporter>()? {
        println!("{}: {}", exporter.format(), exporter.export(&data));
    }

    // The same plugins through the process-wide default lookup
    set_default_group("demo.exporters")?;
    let lookup: Arc<dyn Lookup> = default_lookup()?;
    println!(
        "default lookup has {} exporters",
        lookup.lookup_all::<dyn Exporter>()?.len()
    );

    Ok(())
}
