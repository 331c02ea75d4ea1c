//! The user journey the smoke test walks through
//!
//! Each step either completes within its configured timeout or fails the
//! run. Steps are exposed individually so the runner can check for page
//! errors between them.

use tracing::{debug, info};

use crate::config::{SelectorMap, SmokeConfig};
use crate::error::{E2eError, E2eResult};
use crate::inference::{infer, AnswerAction};
use crate::page::{Page, WaitState};
use crate::snapshot::{read_signature, read_snapshot, ProblemSignature};

/// Drives the page with the selectors, labels and timeouts from the config
pub struct Scenario<'a> {
    page: &'a Page,
    config: &'a SmokeConfig,
}

impl<'a> Scenario<'a> {
    pub fn new(page: &'a Page, config: &'a SmokeConfig) -> Self {
        Self { page, config }
    }

    fn selectors(&self) -> &SelectorMap {
        &self.config.selectors
    }

    /// Wait for the problem area, keypad and answer box
    pub async fn wait_for_ui(&self) -> E2eResult<()> {
        let timeout = self.config.timeouts.element();
        let selectors = self.selectors();
        for selector in [
            selectors.problem.clone(),
            selectors.keypad.clone(),
            selectors.answer_box(),
        ] {
            self.page
                .wait_for(&selector, WaitState::Attached, timeout)
                .await?;
        }
        debug!("UI ready");
        Ok(())
    }

    /// Read, interpret and answer the problem on screen, then wait for the
    /// feedback region.
    pub async fn answer_current_problem(&self) -> E2eResult<AnswerAction> {
        let snapshot = read_snapshot(self.page, self.selectors())
            .await?
            .ok_or_else(|| {
                E2eError::Precondition(format!(
                    "equation container {} not found",
                    self.selectors().container
                ))
            })?;
        snapshot.ensure_well_formed()?;

        let action = infer(&snapshot)?;
        info!("Problem \"{}\" -> {}", snapshot.text, action);

        self.perform(action).await?;

        self.page
            .wait_for(
                &self.selectors().feedback,
                WaitState::Visible,
                self.config.timeouts.feedback(),
            )
            .await?;
        Ok(action)
    }

    /// Enter an answer through the on-screen controls
    pub async fn perform(&self, action: AnswerAction) -> E2eResult<()> {
        let timeout = self.config.timeouts.action();
        match action {
            AnswerAction::Compare(cmp) => {
                self.page.click_button(cmp.symbol(), None, timeout).await?;
            }
            AnswerAction::Number(_) => {
                let keys = action.keys().unwrap_or_default();
                for key in keys.chars() {
                    self.page
                        .click_button(&key.to_string(), Some(&self.selectors().keypad), timeout)
                        .await?;
                }
                self.page
                    .click_button(&self.config.labels.confirm, None, timeout)
                    .await?;
            }
        }
        Ok(())
    }

    /// The page must have persisted progress after an answer
    pub async fn assert_progress_saved(&self) -> E2eResult<()> {
        let key = &self.selectors().storage_key;
        match self.page.local_storage_item(key).await? {
            Some(value) if !value.trim().is_empty() => {
                debug!("localStorage[{}] holds {} bytes", key, value.len());
                Ok(())
            }
            _ => Err(E2eError::AssertionFailed(format!(
                "localStorage key \"{}\" missing or empty after answering",
                key
            ))),
        }
    }

    async fn click_next(&self) -> E2eResult<()> {
        self.page
            .click(&self.selectors().next_button, self.config.timeouts.action())
            .await?;
        self.page
            .wait_for(
                &self.selectors().feedback,
                WaitState::Hidden,
                self.config.timeouts.feedback(),
            )
            .await
    }

    /// Wait for the signature to move away from `before`
    async fn wait_for_new_problem(&self, before: &ProblemSignature) -> E2eResult<bool> {
        let deadline = tokio::time::Instant::now() + self.config.timeouts.next_problem();
        loop {
            let after = read_signature(self.page, self.selectors()).await?;
            if &after != before {
                debug!("Next problem: {}", after);
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    /// "Next" must bring up a different exercise.
    ///
    /// Problems are random and may repeat, so an unchanged signature is
    /// answered and advanced again, up to the configured retry bound.
    pub async fn ensure_next_changes_exercise(&self) -> E2eResult<()> {
        let before = read_signature(self.page, self.selectors()).await?;
        let retries = self.config.max_advance_retries;

        self.click_next().await?;
        for attempt in 0..=retries {
            if self.wait_for_new_problem(&before).await? {
                return Ok(());
            }
            if attempt == retries {
                break;
            }
            info!("Same problem after \"next\", retrying ({}/{})", attempt + 1, retries);
            self.answer_current_problem().await?;
            self.assert_progress_saved().await?;
            self.click_next().await?;
        }

        Err(E2eError::DidNotAdvance(retries + 1))
    }

    /// The parent dashboard stays closed for a wrong PIN and opens for the
    /// right one.
    pub async fn exercise_pin_gate(&self) -> E2eResult<()> {
        let selectors = self.selectors();
        let timeouts = &self.config.timeouts;
        let parent_open = SelectorMap::open(&selectors.parent_dialog);

        self.page
            .click_button(&self.config.labels.dashboard, None, timeouts.action())
            .await?;
        self.page
            .wait_for(
                &SelectorMap::open(&selectors.pin_dialog),
                WaitState::Attached,
                timeouts.pin_dialog(),
            )
            .await?;

        self.page
            .fill(&selectors.pin_input, &self.config.pins.wrong, timeouts.action())
            .await?;
        self.page
            .click(&selectors.pin_confirm, timeouts.action())
            .await?;
        self.page
            .wait_for(&selectors.pin_message, WaitState::Visible, timeouts.pin_message())
            .await?;

        if self.page.is_present(&parent_open).await? {
            return Err(E2eError::AssertionFailed(
                "parent dashboard opened with a wrong PIN".to_string(),
            ));
        }
        debug!("Wrong PIN rejected");

        self.page
            .fill(&selectors.pin_input, &self.config.pins.correct, timeouts.action())
            .await?;
        self.page
            .click(&selectors.pin_confirm, timeouts.action())
            .await?;
        self.page
            .wait_for(&parent_open, WaitState::Attached, timeouts.parent_dialog())
            .await?;

        self.page
            .click_button(
                &self.config.labels.close,
                Some(&selectors.parent_dialog),
                timeouts.action(),
            )
            .await?;
        info!("PIN gate behaves");
        Ok(())
    }
}
