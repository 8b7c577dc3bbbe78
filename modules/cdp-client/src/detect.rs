//! Bot-check and daily-limit detection.
//!
//! Only visible, full-page blocking elements count as a bot check. Hidden
//! tracking iframes and small widgets must not trigger; the probe therefore
//! requires visibility (offsetParent) and, for CAPTCHA iframes, a minimum
//! rendered size.

use chromiumoxide::page::Page;

use crate::error::{CdpError, Result};

/// Simple clickable checkboxes that sometimes dismiss a challenge outright.
const CHECKBOX_SELECTORS: &[&str] = &[".recaptcha-checkbox", "#recaptcha-anchor"];

const MAX_DISMISS_ATTEMPTS: u32 = 3;

/// Case-insensitive phrases that mean the source's quota is exhausted.
const DAILY_LIMIT_INDICATORS: &[&str] = &[
    "daily limit",
    "reached your limit",
    "limit reached",
    "search limit",
    "too many searches",
    "come back tomorrow",
];

/// One injected probe instead of per-selector round-trips. Returns the
/// matched selector, or null when the page is clean.
const BOT_CHECK_PROBE: &str = r#"
(function() {
    var blockerSelectors = [
        '#challenge-running',
        '#challenge-form',
        '#cf-wrapper',
        'div.captcha-overlay',
        'div.robot-check-overlay'
    ];
    for (var i = 0; i < blockerSelectors.length; i++) {
        var el = document.querySelector(blockerSelectors[i]);
        if (el && el.offsetParent !== null) {
            return blockerSelectors[i];
        }
    }
    var iframeSelectors = [
        'iframe[src*="challenges.cloudflare.com"]',
        'iframe[src*="hcaptcha.com/captcha"]'
    ];
    for (var i = 0; i < iframeSelectors.length; i++) {
        var el = document.querySelector(iframeSelectors[i]);
        if (el && el.offsetParent !== null) {
            var rect = el.getBoundingClientRect();
            if (rect.width > 200 && rect.height > 100) {
                return iframeSelectors[i];
            }
        }
    }
    return null;
})()
"#;

/// Check whether a visible blocking challenge is present.
pub(crate) async fn find_blocking_challenge(page: &Page) -> Result<Option<String>> {
    let result = page.evaluate(BOT_CHECK_PROBE).await?;
    let matched: Option<String> = result.into_value().unwrap_or(None);
    Ok(matched)
}

/// Detect a bot check and try to dismiss it by clicking a verification
/// checkbox, up to three attempts. Leaves the decision to close or preserve
/// the tab to the caller.
pub(crate) async fn handle_bot_check(page: &Page, source: &str) -> Result<()> {
    for _attempt in 0..MAX_DISMISS_ATTEMPTS {
        let matched = match find_blocking_challenge(page).await {
            Ok(m) => m,
            // A failed probe is not evidence of a challenge.
            Err(_) => return Ok(()),
        };

        let Some(selector) = matched else {
            return Ok(());
        };
        tracing::warn!(source, selector = selector.as_str(), "Blocking challenge detected");

        let mut clicked = false;
        for checkbox in CHECKBOX_SELECTORS {
            if let Ok(element) = page.find_element(*checkbox).await {
                if element.click().await.is_ok() {
                    clicked = true;
                    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                    break;
                }
            }
        }

        if clicked {
            // Give the verification a moment, then recheck.
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            continue;
        }

        return Err(CdpError::BotCheck { source_name: source.to_string() });
    }

    // Attempts exhausted; if the challenge is still up, it needs a human.
    if find_blocking_challenge(page).await.ok().flatten().is_some() {
        return Err(CdpError::BotCheck { source_name: source.to_string() });
    }
    Ok(())
}

/// Scan rendered page text for quota-exhausted messages.
pub(crate) fn daily_limit_indicator(content: &str) -> Option<&'static str> {
    let lower = content.to_lowercase();
    DAILY_LIMIT_INDICATORS.iter().copied().find(|phrase| lower.contains(phrase))
}
