//! Panic hook: a readable backtrace in debug builds, a friendly crash
//! report (with a saved dump path) in release builds. Standard pairing of
//! `better-panic` and `human-panic` with `color-eyre`'s own hook, installed
//! once at startup before anything else runs.

use color_eyre::eyre::Result;
use human_panic::{handle_dump, print_msg, Metadata};

pub fn install() -> Result<()> {
    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install()?;

    std::panic::set_hook(Box::new(move |panic_info| {
        if cfg!(debug_assertions) {
            eprintln!("{}", panic_hook.panic_report(panic_info));
            better_panic::Settings::auto().create_panic_handler()(panic_info);
        } else {
            let meta = Metadata::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
                .authors(env!("CARGO_PKG_AUTHORS").replace(':', ", "))
                .homepage(env!("CARGO_PKG_HOMEPAGE"));
            let file_path = handle_dump(&meta, panic_info);
            print_msg(file_path, &meta).ok();
        }
    }));

    Ok(())
}
