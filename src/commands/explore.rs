use std::path::{Path, PathBuf};

use colored::Colorize;
use tokio_util::sync::CancellationToken;

use crate::browser::{BrowserHandle, PageDriver};
use crate::config::Config;
use crate::error::{Result, WayfarerError};
use crate::explore::oracle::OracleClient;
use crate::explore::{Explorer, TestPlan};

pub struct ExploreOptions {
    pub url: String,
    pub max_navigations: Option<u32>,
    pub max_clicks: Option<u32>,
    pub output: Option<PathBuf>,
    pub headed: bool,
    pub oracle: bool,
    pub json: bool,
    pub config_path: Option<PathBuf>,
}

pub async fn run(options: ExploreOptions) -> Result<()> {
    let mut config = match options.config_path {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(n) = options.max_navigations {
        config.explore.max_navigations = n;
    }
    if let Some(n) = options.max_clicks {
        config.explore.max_clicks = n;
    }
    if options.headed {
        config.browser.headless = false;
    }
    if options.oracle {
        config.oracle.enabled = true;
    }

    let output = options
        .output
        .unwrap_or_else(|| PathBuf::from("wayfarer-plan.json"));

    if !options.json {
        println!(
            "{} {}",
            "Exploring".bold().green(),
            options.url.as_str().cyan()
        );
    }

    let handle = BrowserHandle::launch(&config).await?;
    let result = explore_with(&handle, &config, &options.url, &output, options.json).await;
    handle.close().await;

    result
}

async fn explore_with(
    handle: &BrowserHandle,
    config: &Config,
    url: &str,
    output: &Path,
    json: bool,
) -> Result<()> {
    let driver = handle.new_page().await?;

    // Cookies go in before any page script can run
    for cookie in &config.cookies {
        let scope = cookie.url.as_deref().unwrap_or(url);
        driver.set_cookie(&cookie.name, &cookie.value, scope).await?;
        tracing::debug!("Injected cookie {} for {}", cookie.name, scope);
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{}", "Stopping after the current step...".yellow());
            signal_token.cancel();
        }
    });

    let oracle = OracleClient::from_settings(&config.oracle);
    if oracle.is_some() && !json {
        println!("  {} {}", "oracle:".dimmed(), config.oracle.model);
    }

    let mut explorer = Explorer::new(&driver, &config.explore, oracle.as_ref(), cancel, url)?;
    explorer.set_oracle_cap(config.oracle.max_elements);

    let outcome = explorer.run().await;

    // Whatever happened, the steps recorded so far become the plan
    let plan = explorer.plan();
    write_plan(output, &plan)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("{} {}", "Plan written to".bold(), output.display());
        summarize(&plan, explorer.navigations(), explorer.interactions());
    }

    match outcome {
        Ok(outcome) => {
            if !json {
                println!("{} {}", "Done:".bold().green(), outcome.describe());
            }
            Ok(())
        }
        Err(WayfarerError::Cancelled) => {
            if !json {
                println!("{}", "Stopped by user; partial plan saved.".yellow());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "Exploration failed:".red(), e);
            Err(e)
        }
    }
}

fn write_plan(path: &Path, plan: &TestPlan) -> Result<()> {
    let json = serde_json::to_string_pretty(plan)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn summarize(plan: &TestPlan, navigations: u32, interactions: u32) {
    println!(
        "  {} {} step(s), {} navigation(s), {} interaction(s)",
        "recorded:".dimmed(),
        plan.steps.len(),
        navigations,
        interactions
    );
    for step in &plan.steps {
        let marker = if step.navigated {
            "->".green()
        } else {
            " .".dimmed()
        };
        println!(
            "  {} {} {} \"{}\"",
            marker,
            step.step,
            step.action.as_str(),
            step.element.text
        );
    }
}
