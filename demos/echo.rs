//! Minimal switchboard client: an echo component answering pushes on its
//! own channel, driven by a background run loop.
//!
//! Run with `cargo run --example echo`.

use std::thread;
use std::time::Duration;

use switchboard::{Component, Event, Handler, RunConfig, logger};

fn main() {
    if let Err(e) = logger::init("info") {
        eprintln!("error: {e}");
        std::process::exit(1);
    }

    let app = Component::new();

    let echo = Component::with_channel("echo");
    let relay = echo.clone();
    echo.add_handler(Handler::listener("say", move |args, _| {
        let text = args[0].as_str().unwrap_or_default();
        println!("<echo> {text}");
        relay.push(Event::new("Said").arg(text), "said");
        Ok(None)
    }));
    echo.register(&app);

    app.start_with(&RunConfig::sleeping(10));

    for text in ["hello", "from", "switchboard"] {
        app.push_to(Event::new("Say").arg(text), "say", "echo");
        thread::sleep(Duration::from_millis(20));
    }

    thread::sleep(Duration::from_millis(50));
    app.stop();
}
