//! Demonstrates using a lookup as a service locator.
//!
//! Components publish services into an `InstanceContent` and consumers find
//! them through the `GenericLookup` by type or by capability, without knowing
//! who registered them.
//!
//! Run with: cargo run --example service_locator

use sovran_lookup::{Entry, GenericLookup, Lookup, LookupError, LookupExt};
use std::sync::Arc;

fn main() -> Result<(), LookupError> {
    let (content, lookup) = GenericLookup::with_content();

    // Plain values are registered by type
    content.add(Arc::new(DatabaseConfig {
        host: "localhost".to_string(),
        port: 5432,
        database: "myapp".to_string(),
    }))?;

    content.add(Arc::new(AppConfig {
        name: "MyApp".to_string(),
        debug: true,
    }))?;

    // Loggers are found through the capability they provide
    content.add(Entry::new(ConsoleLogger::new("app")).provides(|l| l as Arc<dyn Logger>))?;
    content.add(Entry::new(AuditLogger).provides(|l| l as Arc<dyn Logger>))?;

    // Expensive services are built on first use
    content.add(Entry::lazy("mailer", || {
        println!("  (building mailer)");
        Ok(Mailer {
            relay: "smtp.localhost".to_string(),
        })
    }))?;

    let services: Arc<dyn Lookup> = Arc::new(lookup);
    let user_service = UserService::new(Arc::clone(&services));
    let order_service = OrderService::new(Arc::clone(&services));

    user_service.create_user("alice")?;
    user_service.create_user("bob")?;
    order_service.create_order("alice", "Widget")?;

    // Replacing the configuration is a remove and an add
    if let Some(config) = services.lookup::<AppConfig>()? {
        content.remove(&config)?;
        content.add(Arc::new(AppConfig {
            name: config.name.clone(),
            debug: false,
        }))?;
        println!("Debug mode disabled");
    }

    println!("\nFinal configuration:");
    if let Some(cfg) = services.lookup::<AppConfig>()? {
        println!("  App: {}", cfg.name);
        println!("  Debug: {}", cfg.debug);
    }
    if let Some(db) = services.lookup::<DatabaseConfig>()? {
        println!("  Database: {}:{}/{}", db.host, db.port, db.database);
    }
    println!("  Loggers: {}", services.lookup_all::<dyn Logger>()?.len());

    Ok(())
}

// ============================================================================
// Configuration and services published into the lookup
// ============================================================================

#[derive(Debug)]
struct DatabaseConfig {
    host: String,
    port: u16,
    database: String,
}

#[derive(Debug)]
struct AppConfig {
    name: String,
    debug: bool,
}

trait Logger: Send + Sync {
    fn log(&self, message: &str);
}

struct ConsoleLogger {
    prefix: String,
}

impl ConsoleLogger {
    fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }
}

impl Logger for ConsoleLogger {
    fn log(&self, message: &str) {
        println!("[{}] {}", self.prefix, message);
    }
}

struct AuditLogger;

impl Logger for AuditLogger {
    fn log(&self, message: &str) {
        println!("[audit] {}", message);
    }
}

struct Mailer {
    relay: String,
}

impl Mailer {
    fn send(&self, to: &str, subject: &str) {
        println!("  -> Mail to {} via {}: {}", to, self.relay, subject);
    }
}

// ============================================================================
// Consumers that only know the lookup
// ============================================================================

fn log_all(services: &Arc<dyn Lookup>, message: &str) -> Result<(), LookupError> {
    for logger in services.lookup_all::<dyn Logger>()? {
        logger.log(message);
    }
    Ok(())
}

struct UserService {
    services: Arc<dyn Lookup>,
}

impl UserService {
    fn new(services: Arc<dyn Lookup>) -> Self {
        Self { services }
    }

    fn create_user(&self, username: &str) -> Result<(), LookupError> {
        log_all(&self.services, &format!("Creating user: {}", username))?;

        if let Some(db) = self.services.lookup::<DatabaseConfig>()? {
            println!(
                "  -> Would insert into {}.users on {}:{}",
                db.database, db.host, db.port
            );
        }

        if let Some(mailer) = self.services.lookup::<Mailer>()? {
            mailer.send(username, "Welcome!");
        }

        if let Some(cfg) = self.services.lookup::<AppConfig>()? {
            if cfg.debug {
                println!("  -> [DEBUG] User {} created successfully", username);
            }
        }

        Ok(())
    }
}

struct OrderService {
    services: Arc<dyn Lookup>,
}

impl OrderService {
    fn new(services: Arc<dyn Lookup>) -> Self {
        Self { services }
    }

    fn create_order(&self, user: &str, item: &str) -> Result<(), LookupError> {
        log_all(&self.services, &format!("Creating order: {} for {}", item, user))?;

        if let Some(db) = self.services.lookup::<DatabaseConfig>()? {
            println!(
                "  -> Would insert into {}.orders on {}:{}",
                db.database, db.host, db.port
            );
        }

        Ok(())
    }
}
