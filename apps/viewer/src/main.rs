use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use directory_core::{
    sample_users, DirectoryController, HttpUserSource, StaticUserSource, UserSource, ViewSnapshot,
};
use shared::{query::DEFAULT_LIMIT, validation::Field};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

mod config;

use config::{load_settings, normalize_page_limit};

#[derive(Parser, Debug)]
struct Args {
    /// Base URL of a user-directory server exposing GET /users.
    #[arg(long, conflicts_with = "demo")]
    server_url: Option<String>,
    /// Run against a built-in sample directory with simulated latency.
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut settings = load_settings();
    if args.server_url.is_some() {
        settings.server_url = args.server_url;
    }

    let source: Arc<dyn UserSource> = match (&settings.server_url, args.demo) {
        (Some(url), false) => {
            info!(%url, "fetching users over http");
            Arc::new(HttpUserSource::new(url)?)
        }
        _ => {
            info!("using the built-in sample directory");
            Arc::new(
                StaticUserSource::new(sample_users(26))
                    .with_latency(Duration::from_millis(300)),
            )
        }
    };

    let quiet_period = Duration::from_millis(settings.quiet_period_ms);
    let controller = DirectoryController::new(source, quiet_period);

    let render_controller = Arc::clone(&controller);
    let mut events = controller.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(_event) => render(&render_controller.snapshot().await),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let limit = normalize_page_limit(settings.page_limit);
    if limit != DEFAULT_LIMIT {
        controller.set_limit(limit).await;
    } else {
        controller.refresh().await;
    }

    println!("commands: name <text> | age <text> | prev | next | limit <4|8|12> | refresh | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "" => {}
            "name" => {
                if let Some(error) = controller.set_filter(Field::Name, rest.trim()).await {
                    println!("{error}");
                }
            }
            "age" => {
                if let Some(error) = controller.set_filter(Field::Age, rest.trim()).await {
                    println!("{error}");
                }
            }
            "prev" => {
                if !controller.prev_page().await {
                    println!("already on the first page (or still loading)");
                }
            }
            "next" => {
                if !controller.next_page().await {
                    println!("no further pages (or still loading)");
                }
            }
            "limit" => {
                let accepted = match rest.trim().parse::<u32>() {
                    Ok(limit) => controller.set_limit(limit).await,
                    Err(_) => false,
                };
                if !accepted {
                    println!("offered limits: 4, 8, 12");
                }
            }
            "refresh" => controller.refresh().await,
            "quit" | "exit" => break,
            other => println!("unknown command: {other}"),
        }
    }

    controller.shutdown();
    Ok(())
}

fn render(snapshot: &ViewSnapshot) {
    println!();
    println!(
        "== Users List | page {} | limit {} | name=\"{}\" age=\"{}\" ==",
        snapshot.page_number,
        snapshot.pagination.limit,
        snapshot.filters.name,
        snapshot.filters.age,
    );
    if let Some(error) = &snapshot.name_error {
        println!("name: {error}");
    }
    if let Some(error) = &snapshot.age_error {
        println!("age: {error}");
    }
    if snapshot.is_loading {
        println!("loading...");
        return;
    }
    if let Some(error) = &snapshot.error {
        println!("error: {error}");
        return;
    }
    if snapshot.users.is_empty() {
        println!("Users not found");
        return;
    }
    for user in &snapshot.users {
        println!("{}, {}", user.name, user.age);
    }
    println!(
        "[prev: {}] [next: {}]",
        if snapshot.can_prev { "enabled" } else { "disabled" },
        if snapshot.can_next { "enabled" } else { "disabled" },
    );
}
