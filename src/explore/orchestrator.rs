use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::browser::PageDriver;
use crate::config::ExploreSettings;
use crate::error::{Result, WayfarerError};

use super::discovery::discover_elements;
use super::element::InteractiveElement;
use super::executor::{InteractionExecutor, InteractionOutcome};
use super::oracle::{OracleClient, PageContext};
use super::plan::{PageAnalysis, PageSnapshot, StepElement, TestPlan, TestStep};
use super::selector;
use super::tracker::InteractionTracker;
use super::urls::{ensure_same_origin, force_new_page, fragment_of, UrlTracker, Visit};

/// Why a run ended. Cancellation is not an outcome; it surfaces as
/// [`WayfarerError::Cancelled`] so callers can tell a clean stop apart
/// from exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExploreOutcome {
    /// The navigation target was reached
    TargetReached,
    /// The absolute interaction budget ran out first
    ClickBudgetExhausted,
    /// Two consecutive scans found nothing to interact with
    NoElements,
    /// Repeated non-progress and the forced-navigation escape hatch
    /// found no unvisited page either
    EscapeHatchExhausted,
}

impl ExploreOutcome {
    pub fn describe(&self) -> &'static str {
        match self {
            ExploreOutcome::TargetReached => "navigation target reached",
            ExploreOutcome::ClickBudgetExhausted => "interaction budget exhausted",
            ExploreOutcome::NoElements => "no interactive elements found",
            ExploreOutcome::EscapeHatchExhausted => "no way to reach an unvisited page",
        }
    }
}

const ANALYZE_JS: &str = r#"
(function() {
    const headings = [];
    for (const h of document.querySelectorAll('h1, h2, h3')) {
        const text = (h.textContent || '').trim();
        if (text) headings.push(text.slice(0, 80));
        if (headings.length >= 5) break;
    }
    return {
        title: (document.title || '').slice(0, 120),
        headings: headings,
        forms: document.querySelectorAll('form').length,
        buttons: document.querySelectorAll('button, [role="button"], input[type="submit"]').length,
        links: document.querySelectorAll('a[href]').length,
        inputs: document.querySelectorAll('input, textarea, select').length
    };
})()
"#;

#[derive(Debug, Default, Deserialize)]
struct PageProbe {
    #[serde(default)]
    title: String,
    #[serde(default)]
    headings: Vec<String>,
    #[serde(default)]
    forms: u32,
    #[serde(default)]
    buttons: u32,
    #[serde(default)]
    links: u32,
    #[serde(default)]
    inputs: u32,
}

/// Drives one bounded exploration run over a single page/tab. Owns all
/// run state; the browser is reached only through the injected driver.
pub struct Explorer<'a> {
    driver: &'a dyn PageDriver,
    settings: &'a ExploreSettings,
    oracle: Option<&'a OracleClient>,
    cancel: CancellationToken,
    urls: UrlTracker,
    tracker: InteractionTracker,
    steps: Vec<TestStep>,
    analyses: Vec<PageAnalysis>,
    navigations: u32,
    interactions: u32,
    failures: u32,
    pending_curation: bool,
    oracle_cap: usize,
}

impl<'a> Explorer<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        settings: &'a ExploreSettings,
        oracle: Option<&'a OracleClient>,
        cancel: CancellationToken,
        start_url: &str,
    ) -> Result<Self> {
        Ok(Self {
            driver,
            settings,
            oracle,
            cancel,
            urls: UrlTracker::new(start_url)?,
            tracker: InteractionTracker::new(settings.history_size),
            steps: Vec::new(),
            analyses: Vec::new(),
            navigations: 0,
            interactions: 0,
            failures: 0,
            pending_curation: false,
            oracle_cap: 20,
        })
    }

    /// Cap on candidates shown to the oracle per call
    pub fn set_oracle_cap(&mut self, cap: usize) {
        self.oracle_cap = cap;
    }

    pub fn navigations(&self) -> u32 {
        self.navigations
    }

    pub fn interactions(&self) -> u32 {
        self.interactions
    }

    /// Synthesize the plan from whatever has been recorded so far. Valid
    /// after any run end, including cancellation and mid-run failure.
    pub fn plan(&self) -> TestPlan {
        super::plan::synthesize(self.urls.initial_url(), &self.analyses, self.steps.clone())
    }

    pub async fn run(&mut self) -> Result<ExploreOutcome> {
        let start = self.urls.initial_url().to_string();
        tracing::info!("Starting exploration at {}", start);

        // The one navigation that is allowed to be fatal
        self.driver.navigate(&start).await?;
        let _ = self.driver.wait_for_load(self.nav_timeout()).await;

        let landed = self.driver.current_url().await.unwrap_or(start);
        self.urls.record_visit(&landed);
        self.analyze_current_page().await;

        loop {
            self.check_cancelled()?;

            if self.navigations >= self.settings.max_navigations {
                tracing::info!("Reached {} navigations", self.navigations);
                return Ok(ExploreOutcome::TargetReached);
            }
            if self.interactions >= self.settings.max_clicks {
                tracing::info!("Spent the full budget of {} interactions", self.interactions);
                return Ok(ExploreOutcome::ClickBudgetExhausted);
            }

            let candidates = match self.scan_with_retry().await {
                Some(candidates) => candidates,
                None => return Ok(ExploreOutcome::NoElements),
            };

            if self.pending_curation {
                self.curate_latest_analysis(&candidates).await;
            }

            let context = self.page_context().await;
            let selection = match selector::select(
                &candidates,
                &self.urls,
                &self.tracker,
                self.oracle,
                &context,
                self.oracle_cap,
            )
            .await
            {
                Some(selection) => selection,
                None => return Ok(ExploreOutcome::NoElements),
            };
            let element = candidates[selection.index].clone();

            tracing::info!(
                "Step {}: {} \"{}\" via {}",
                self.interactions + 1,
                element.kind.as_str(),
                element.text,
                selection.method.as_str()
            );

            let executor = InteractionExecutor::new(self.driver, self.settings);
            let outcome = executor
                .interact(
                    &element,
                    selection.action_hint.as_deref(),
                    selection.value_hint.as_deref(),
                )
                .await;
            self.interactions += 1;
            self.check_cancelled()?;

            let progressed = self.account_for(&outcome).await;
            self.tracker.remember(&element);
            self.record_step(&element, &outcome, progressed);
            ensure_same_origin(self.driver, &self.urls).await;

            if self.failures >= self.settings.failure_cutoff {
                tracing::warn!(
                    "{} interactions without progress, forcing a page change",
                    self.failures
                );
                match force_new_page(self.driver, &self.urls, self.nav_timeout()).await {
                    Some(url) => {
                        self.urls.record_visit(&url);
                        self.navigations += 1;
                        self.failures = 0;
                        self.analyze_current_page().await;
                    }
                    None => return Ok(ExploreOutcome::EscapeHatchExhausted),
                }
            }
        }
    }

    fn nav_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.nav_timeout_ms)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            tracing::info!("Exploration cancelled");
            Err(WayfarerError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// One scan, and on an empty page one more after an extended wait for
    /// late-rendering applications.
    async fn scan_with_retry(&self) -> Option<Vec<InteractiveElement>> {
        let origin = self.urls.base_origin().to_string();
        let candidates = discover_elements(self.driver, &origin, self.settings).await;
        if !candidates.is_empty() {
            return Some(candidates);
        }

        tracing::info!(
            "Page shows no interactive elements, rescanning in {}ms",
            self.settings.scan_retry_ms
        );
        tokio::time::sleep(Duration::from_millis(self.settings.scan_retry_ms)).await;

        let candidates = discover_elements(self.driver, &origin, self.settings).await;
        if candidates.is_empty() {
            None
        } else {
            Some(candidates)
        }
    }

    /// Decide whether the interaction made progress and update counters.
    /// A new page or a new fragment-only virtual state both advance the
    /// navigation count; everything else is a failure for cutoff purposes.
    async fn account_for(&mut self, outcome: &InteractionOutcome) -> bool {
        if outcome.navigated {
            if !self.urls.in_origin(&outcome.url_after) {
                // The origin guardrail will bounce this back; no progress
                tracing::debug!("Interaction left the origin for {}", outcome.url_after);
                self.failures += 1;
                return false;
            }
            match self.urls.record_visit(&outcome.url_after) {
                Visit::NewPage => {
                    self.navigations += 1;
                    self.failures = 0;
                    self.analyze_current_page().await;
                    return true;
                }
                Visit::Revisit => {
                    tracing::debug!("Landed on already-visited {}", outcome.url_after);
                    self.failures += 1;
                    return false;
                }
            }
        }

        if outcome.fragment_only {
            if let Some(fragment) = fragment_of(&outcome.url_after) {
                if self.urls.record_virtual(&outcome.url_after, &fragment) {
                    tracing::debug!("New in-page state #{}", fragment);
                    self.navigations += 1;
                    self.failures = 0;
                    self.analyze_current_page().await;
                    return true;
                }
            }
        }

        self.failures += 1;
        false
    }

    async fn analyze_current_page(&mut self) {
        let url = self.driver.current_url().await.unwrap_or_default();
        let probe = match self.driver.evaluate(ANALYZE_JS).await {
            Ok(value) => serde_json::from_value::<PageProbe>(value).unwrap_or_default(),
            Err(e) => {
                tracing::debug!("Page analysis failed: {}", e);
                PageProbe::default()
            }
        };

        tracing::debug!(
            "Analyzed {}: \"{}\", {} link(s), {} form(s)",
            url,
            probe.title,
            probe.links,
            probe.forms
        );

        self.analyses.push(PageAnalysis {
            url,
            title: probe.title,
            headings: probe.headings,
            forms: probe.forms,
            buttons: probe.buttons,
            links: probe.links,
            inputs: probe.inputs,
            notable_elements: Vec::new(),
        });
        self.pending_curation = self.oracle.is_some();
    }

    /// Backfill oracle-curated notable elements into the newest analysis,
    /// using the candidates of the scan that follows it. Failures leave the
    /// analysis without notables.
    async fn curate_latest_analysis(&mut self, candidates: &[InteractiveElement]) {
        self.pending_curation = false;
        let Some(oracle) = self.oracle else { return };
        if candidates.is_empty() {
            return;
        }

        let context = self.page_context().await;
        match oracle.curate_notable(&context, candidates).await {
            Ok(notable) => {
                if let Some(analysis) = self.analyses.last_mut() {
                    analysis.notable_elements = notable;
                }
            }
            Err(e) => tracing::debug!("Notable-element curation failed: {}", e),
        }
    }

    async fn page_context(&self) -> PageContext {
        let (url, title, headings) = match self.analyses.last() {
            Some(a) => (a.url.clone(), a.title.clone(), a.headings.clone()),
            None => (
                self.driver.current_url().await.unwrap_or_default(),
                String::new(),
                Vec::new(),
            ),
        };

        PageContext {
            url,
            title,
            headings,
            visited_urls: self.urls.visited().iter().take(15).cloned().collect(),
            recent_interactions: self
                .tracker
                .recent_keys(5)
                .iter()
                .map(|k| k.to_string())
                .collect(),
            navigations_done: self.navigations,
            navigation_target: self.settings.max_navigations,
        }
    }

    fn record_step(
        &mut self,
        element: &InteractiveElement,
        outcome: &InteractionOutcome,
        progressed: bool,
    ) {
        let expected = if progressed {
            self.analyses.last().map(|a| PageSnapshot {
                title: a.title.clone(),
                headings: a.headings.clone(),
                notable_elements: a.notable_elements.clone(),
            })
        } else {
            None
        };

        self.steps.push(TestStep {
            step: self.interactions,
            action: outcome.action,
            element: StepElement::from(element),
            url_before: outcome.url_before.clone(),
            url_after: outcome.url_after.clone(),
            navigated: progressed,
            input_value: outcome.value.clone(),
            timestamp_ms: super::plan::now_ms(),
            expected,
        });
    }
}
