pub mod alert;
pub mod config;
pub mod disk;
pub mod models;
pub mod report;
pub mod reporting;
pub mod schema;
pub mod server;
pub mod store;
pub mod transmit;

/// Tracing setup shared by both binaries.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Could not initialize the tracing system!");
}
