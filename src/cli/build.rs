//! Command implementations (dev, build, env)

use std::process::ExitCode;

use super::{EXIT_ERROR, EXIT_SUCCESS};
use crate::build::{BuildPlan, BuildResult, ConsoleNotifier, Runner, TaskContext};
use crate::watch::WatchLoop;

fn report(result: &BuildResult) {
    if result.is_success() {
        println!("{}", result.summary());
    } else {
        eprintln!("{}", result.summary());
    }
}

/// Run the build command: clean, then every asset task.
pub fn run_build(ctx: &TaskContext) -> ExitCode {
    let step = BuildPlan::new(ctx).build();
    let result = Runner::new(ctx, &ConsoleNotifier).run(&step);
    report(&result);

    if result.is_success() {
        ExitCode::from(EXIT_SUCCESS)
    } else {
        ExitCode::from(EXIT_ERROR)
    }
}

/// Run the dev command: build, serve, then watch until interrupted.
///
/// A failed initial build is reported but does not stop the server.
pub fn run_dev(ctx: &TaskContext) -> ExitCode {
    let notifier = ConsoleNotifier;
    let initial = Runner::new(ctx, &notifier).run(&BuildPlan::new(ctx).scripts());
    report(&initial);

    let server = match crate::server::start(ctx) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Server error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    println!("Serving at http://{}", server.addr());
    println!("Press Ctrl+C to stop");

    let mut watch = match WatchLoop::new(ctx, &notifier, server.reloader()) {
        Ok(watch) => watch,
        Err(e) => {
            eprintln!("Watch error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    watch.record(&initial);

    let code = match watch.run() {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Watch error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    };
    server.shutdown();
    code
}

/// Run the env command: print the selected environment.
pub fn run_env(ctx: &TaskContext, json: bool) -> ExitCode {
    let env = ctx.environment();
    let clean_root = match ctx.clean_root() {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if json {
        let value = serde_json::json!({
            "name": env.name(),
            "production": env.is_production(),
            "root": ctx.out_root(),
            "clean_root": clean_root,
            "path": {
                "absolute": env.public_path().absolute,
                "relative": env.public_path().relative,
            },
        });
        match serde_json::to_string_pretty(&value) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::from(EXIT_ERROR);
            }
        }
    } else {
        println!("Environment: {}", env.name());
        println!("  Production: {}", env.is_production());
        println!("  Root: {}", ctx.out_root().display());
        println!("  Clean root: {}", clean_root.display());
        println!("  Absolute path: {}", env.public_path().absolute);
        println!("  Relative path: {}", env.public_path().relative);
    }
    ExitCode::from(EXIT_SUCCESS)
}
