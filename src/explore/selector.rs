use rand::seq::index::sample;

use super::element::InteractiveElement;
use super::oracle::{OracleClient, OracleDecision, PageContext};
use super::tracker::InteractionTracker;
use super::urls::{normalize_url, UrlTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMethod {
    Heuristic,
    Oracle,
}

impl SelectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMethod::Heuristic => "heuristic",
            SelectionMethod::Oracle => "oracle",
        }
    }
}

/// The chosen candidate plus how and why it was chosen
#[derive(Debug, Clone)]
pub struct Selection {
    pub index: usize,
    pub method: SelectionMethod,
    pub reasoning: Option<String>,
    /// Action/value the oracle suggested, if any
    pub action_hint: Option<String>,
    pub value_hint: Option<String>,
}

/// Texts that read like a "return to home" affordance. Oracle choices
/// matching these are blocked to avoid trivial loops back to the start.
fn is_home_like(element: &InteractiveElement) -> bool {
    let mut texts = vec![element.text.to_lowercase()];
    if let Some(ref name) = element.accessible_name {
        texts.push(name.to_lowercase());
    }

    texts.iter().any(|t| {
        let t = t.trim();
        t == "home"
            || t == "homepage"
            || t.contains("back to home")
            || t.contains("return home")
            || t.contains("main page")
    })
}

/// Guardrail applied on top of the oracle's answer
fn is_blocked(
    element: &InteractiveElement,
    urls: &UrlTracker,
    tracker: &InteractionTracker,
) -> bool {
    if tracker.was_recent(element) {
        return true;
    }
    if is_home_like(element) {
        return true;
    }
    if let (Some(href), Some(first)) = (element.href.as_deref(), urls.first_url()) {
        if normalize_url(href) == first {
            return true;
        }
    }
    false
}

fn score(element: &InteractiveElement, urls: &UrlTracker, tracker: &InteractionTracker) -> i32 {
    let mut score = 0;

    if let Some(ref href) = element.href {
        if urls.in_origin(href) && !urls.is_visited(href) {
            score += 100;
        } else if urls.is_visited(href) {
            score -= 40;
        }
    }

    score += match element.kind {
        super::element::ElementKind::Link => 5,
        super::element::ElementKind::Button => 20,
        super::element::ElementKind::Input => 10,
        super::element::ElementKind::Generic => 0,
    };

    if tracker.was_recent(element) {
        score -= 80;
    }

    if is_home_like(element) {
        score -= 30;
    }

    score
}

/// Deterministic scoring over the candidate list; ties break in discovery
/// order. Always yields a selection for a non-empty list.
pub fn select_heuristic(
    candidates: &[InteractiveElement],
    urls: &UrlTracker,
    tracker: &InteractionTracker,
) -> Option<Selection> {
    let mut best: Option<(usize, i32)> = None;

    for (i, el) in candidates.iter().enumerate() {
        let s = score(el, urls, tracker);
        match best {
            Some((_, current)) if s <= current => {}
            _ => best = Some((i, s)),
        }
    }

    best.map(|(index, _)| Selection {
        index,
        method: SelectionMethod::Heuristic,
        reasoning: None,
        action_hint: None,
        value_hint: None,
    })
}

/// Match an oracle-chosen sample element back into the full candidate
/// list, preferring href, then normalized text, then selector.
fn match_back(candidates: &[InteractiveElement], chosen: &InteractiveElement) -> Option<usize> {
    if let Some(ref href) = chosen.href {
        let target = normalize_url(href);
        if let Some(i) = candidates
            .iter()
            .position(|c| c.href.as_deref().map(normalize_url) == Some(target.clone()))
        {
            return Some(i);
        }
    }

    let text = chosen.text.trim().to_lowercase();
    if !text.is_empty() {
        if let Some(i) = candidates
            .iter()
            .position(|c| c.text.trim().to_lowercase() == text)
        {
            return Some(i);
        }
    }

    candidates.iter().position(|c| c.selector == chosen.selector)
}

/// Apply an oracle decision to the full candidate list, enforcing the
/// de-duplication guardrails. Returns None when the decision is unusable
/// and the caller must fall back to the heuristic.
fn apply_decision(
    decision: &OracleDecision,
    sample_indices: &[usize],
    candidates: &[InteractiveElement],
    urls: &UrlTracker,
    tracker: &InteractionTracker,
) -> Option<Selection> {
    if decision.element_index >= sample_indices.len() {
        tracing::warn!(
            "Oracle index {} out of range (sample size {}), falling back to heuristic",
            decision.element_index,
            sample_indices.len()
        );
        return None;
    }

    let direct = sample_indices[decision.element_index];
    let chosen = &candidates[direct];
    let index = match_back(candidates, chosen).unwrap_or(direct);

    if !is_blocked(&candidates[index], urls, tracker) {
        return Some(Selection {
            index,
            method: SelectionMethod::Oracle,
            reasoning: decision.reasoning.clone(),
            action_hint: decision.action.clone(),
            value_hint: decision.value.clone(),
        });
    }

    tracing::debug!(
        "Oracle choice \"{}\" blocked by guardrail, looking for an alternative",
        candidates[index].text
    );

    candidates
        .iter()
        .position(|c| !is_blocked(c, urls, tracker))
        .map(|index| Selection {
            index,
            method: SelectionMethod::Oracle,
            reasoning: Some("guardrail substituted an unblocked element".to_string()),
            action_hint: None,
            value_hint: None,
        })
}

/// Pick one element to act on. Oracle-assisted when a client is available;
/// any oracle failure silently degrades to the heuristic.
pub async fn select(
    candidates: &[InteractiveElement],
    urls: &UrlTracker,
    tracker: &InteractionTracker,
    oracle: Option<&OracleClient>,
    context: &PageContext,
    max_oracle_elements: usize,
) -> Option<Selection> {
    if candidates.is_empty() {
        return None;
    }

    if let Some(oracle) = oracle {
        // Keep the external call's input small: a bounded random subsample
        let cap = max_oracle_elements.max(1);
        let sample_indices: Vec<usize> = if candidates.len() <= cap {
            (0..candidates.len()).collect()
        } else {
            let mut indices = sample(&mut rand::thread_rng(), candidates.len(), cap).into_vec();
            indices.sort_unstable();
            indices
        };

        let sampled: Vec<InteractiveElement> = sample_indices
            .iter()
            .map(|&i| candidates[i].clone())
            .collect();

        match oracle.decide(context, &sampled).await {
            Ok(decision) => {
                if let Some(selection) =
                    apply_decision(&decision, &sample_indices, candidates, urls, tracker)
                {
                    return Some(selection);
                }
            }
            Err(e) => {
                tracing::debug!("Oracle selection failed, using heuristic: {}", e);
            }
        }
    }

    select_heuristic(candidates, urls, tracker)
}
