use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::element::InteractiveElement;

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Click,
    Fill,
    Hover,
    Scroll,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Fill => "fill",
            ActionKind::Hover => "hover",
            ActionKind::Scroll => "scroll",
        }
    }
}

/// An element worth asserting on, with a human-readable reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotableElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub reason: String,
}

/// Expected page state recorded when a step produced navigation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub title: String,
    pub headings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notable_elements: Vec<NotableElement>,
}

/// The element a step acted on, as re-locatable attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepElement {
    pub selector: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessible_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_path: Option<Vec<String>>,
}

impl From<&InteractiveElement> for StepElement {
    fn from(el: &InteractiveElement) -> Self {
        Self {
            selector: el.selector.clone(),
            text: el.text.clone(),
            href: el.href.clone(),
            accessible_name: el.accessible_name.clone(),
            shadow_path: el.shadow_path.clone(),
        }
    }
}

/// One orchestrator iteration's outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStep {
    pub step: u32,
    pub action: ActionKind,
    pub element: StepElement,
    pub url_before: String,
    /// Always the literal post-interaction URL, even when navigated is false
    pub url_after: String,
    pub navigated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_value: Option<String>,
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<PageSnapshot>,
}

/// Structural summary of one visited page, captured right after navigation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub url: String,
    pub title: String,
    pub headings: Vec<String>,
    pub forms: u32,
    pub buttons: u32,
    pub links: u32,
    pub inputs: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notable_elements: Vec<NotableElement>,
}

/// The produced artifact: ordered steps plus metadata. Immutable once
/// synthesized; consumed by the external test-code generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestPlan {
    pub start_url: String,
    pub created_at_ms: u64,
    pub overview: String,
    pub steps: Vec<TestStep>,
}

/// Pure function over the accumulated analyses and steps. Deterministic
/// given its inputs (modulo the creation timestamp).
pub fn synthesize(start_url: &str, analyses: &[PageAnalysis], steps: Vec<TestStep>) -> TestPlan {
    let forms: u32 = analyses.iter().map(|a| a.forms).sum();
    let buttons: u32 = analyses.iter().map(|a| a.buttons).sum();
    let links: u32 = analyses.iter().map(|a| a.links).sum();
    let inputs: u32 = analyses.iter().map(|a| a.inputs).sum();
    let navigations = steps.iter().filter(|s| s.navigated).count();

    let overview = format!(
        "Explored {} page(s) starting from {}. Observed {} form(s), {} button(s), \
         {} link(s), and {} input(s) across visited pages. Recorded {} step(s), \
         {} of which produced navigation.",
        analyses.len(),
        start_url,
        forms,
        buttons,
        links,
        inputs,
        steps.len(),
        navigations
    );

    TestPlan {
        start_url: start_url.to_string(),
        created_at_ms: now_ms(),
        overview,
        steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(n: u32, navigated: bool) -> TestStep {
        TestStep {
            step: n,
            action: ActionKind::Click,
            element: StepElement {
                selector: "#go".to_string(),
                text: "Go".to_string(),
                href: None,
                accessible_name: None,
                shadow_path: None,
            },
            url_before: "https://example.com".to_string(),
            url_after: "https://example.com/next".to_string(),
            navigated,
            input_value: None,
            timestamp_ms: 1000 + u64::from(n),
            expected: None,
        }
    }

    fn analysis(forms: u32, links: u32) -> PageAnalysis {
        PageAnalysis {
            url: "https://example.com".to_string(),
            title: "Example".to_string(),
            headings: vec!["Welcome".to_string()],
            forms,
            buttons: 2,
            links,
            inputs: 1,
            notable_elements: Vec::new(),
        }
    }

    #[test]
    fn overview_aggregates_counts_across_pages() {
        let plan = synthesize(
            "https://example.com",
            &[analysis(1, 5), analysis(2, 3)],
            vec![step(1, true), step(2, false)],
        );

        assert!(plan.overview.contains("2 page(s)"));
        assert!(plan.overview.contains("3 form(s)"));
        assert!(plan.overview.contains("8 link(s)"));
        assert!(plan.overview.contains("2 step(s)"));
        assert!(plan.overview.contains("1 of which produced navigation"));
    }

    #[test]
    fn steps_keep_insertion_order() {
        let plan = synthesize(
            "https://example.com",
            &[],
            vec![step(1, false), step(2, true), step(3, false)],
        );

        let numbers: Vec<u32> = plan.steps.iter().map(|s| s.step).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn optional_fields_are_omitted_not_null() {
        let json = serde_json::to_value(step(1, false)).unwrap();
        let obj = json.as_object().unwrap();

        assert!(!obj.contains_key("input_value"));
        assert!(!obj.contains_key("expected"));
        assert!(!obj["element"].as_object().unwrap().contains_key("href"));
        // url_after is always present even without navigation
        assert_eq!(obj["url_after"], "https://example.com/next");
    }

    #[test]
    fn snapshot_serializes_with_notable_elements() {
        let mut s = step(4, true);
        s.expected = Some(PageSnapshot {
            title: "Next".to_string(),
            headings: vec!["Next page".to_string()],
            notable_elements: vec![NotableElement {
                text: Some("Checkout".to_string()),
                selector: None,
                reason: "primary call to action".to_string(),
            }],
        });

        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["expected"]["title"], "Next");
        assert_eq!(
            json["expected"]["notable_elements"][0]["reason"],
            "primary call to action"
        );
    }

    #[test]
    fn empty_run_still_synthesizes() {
        let plan = synthesize("https://example.com", &[], Vec::new());
        assert!(plan.steps.is_empty());
        assert!(plan.overview.contains("0 page(s)"));
        assert!(plan.created_at_ms > 0);
    }
}
