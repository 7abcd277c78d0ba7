//! Generate → Evaluate → Improve refinement loop.
//!
//! Loop flow per attempt:
//! (Generate if nothing exists yet) → Evaluate pending → partition →
//! Improve what failed → next attempt, until nothing is pending or the
//! attempt budget is spent.
//!
//! Foundation:
//! - K_i: Only the evaluator moves items out of pending
//! - K_i: Every attempt counts against the budget, whatever it achieved
//! - B_i: Model replies may be malformed → contained, never escape the loop
//! - I^B: Whether the model converges is unknowable → bounded attempts

use crate::client::ModelGateway;
use crate::models::{GenerationConfig, Item, Result, RunStats, WorkingSet};
use crate::stages::{Correlation, Evaluator, Generator, Improver};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Something that happened during a refinement run.
///
/// Events are handed to the caller's observer as they happen and also
/// returned in the outcome; the loop itself does not log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RefineEvent {
    AttemptStarted {
        attempt: usize,
        max_attempts: usize,
    },
    Generated {
        requested: usize,
        received: usize,
    },
    GenerationUnparsable {
        error: String,
    },
    Evaluated {
        evaluated: usize,
        passed: usize,
        failed: usize,
        missing: usize,
        matched_by_id: bool,
    },
    EvaluationUnparsable {
        evaluated: usize,
        error: String,
    },
    Improved {
        sent: usize,
        received: usize,
    },
    ImprovementUnparsable {
        error: String,
    },
    BackingOff {
        delay_ms: u64,
    },
    Converged {
        attempts: usize,
        accepted: usize,
    },
    BudgetExhausted {
        attempts: usize,
        accepted: usize,
        pending: usize,
    },
}

/// Final state of a refinement run.
#[derive(Debug, Clone)]
pub struct RefinementOutcome {
    /// Accepted items, followed by still-pending items if the budget ran out
    pub items: Vec<Item>,

    pub stats: RunStats,

    pub events: Vec<RefineEvent>,
}

impl RefinementOutcome {
    pub fn converged(&self) -> bool {
        self.stats.converged
    }

    pub fn attempts(&self) -> usize {
        self.stats.attempts
    }

    /// Items rated "Good enough".
    pub fn accepted(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|i| i.rating.is_pass())
    }
}

/// Budget and pacing of the loop.
#[derive(Debug, Clone)]
struct LoopSettings {
    max_attempts: usize,
    retry_backoff: Duration,
    max_backoff: Duration,
}

impl From<&GenerationConfig> for LoopSettings {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl LoopSettings {
    /// Delay before the next attempt after `consecutive` parse failures in a row.
    fn backoff(&self, consecutive: u32) -> Duration {
        if self.retry_backoff.is_zero() || consecutive == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(consecutive - 1);
        self.retry_backoff
            .saturating_mul(factor)
            .min(self.max_backoff.max(self.retry_backoff))
    }
}

struct EventLog<F> {
    observer: F,
    events: Vec<RefineEvent>,
}

impl<F: FnMut(&RefineEvent)> EventLog<F> {
    fn emit(&mut self, event: RefineEvent) {
        (self.observer)(&event);
        self.events.push(event);
    }
}

/// Drives generation, evaluation and improvement until every idea passes
/// or the attempt budget is spent.
pub struct RefinementLoop {
    generator: Generator,
    evaluator: Evaluator,
    improver: Improver,
    settings: LoopSettings,
}

impl RefinementLoop {
    pub fn new(gateway: Arc<dyn ModelGateway>, config: &GenerationConfig) -> Self {
        Self {
            generator: Generator::new(Arc::clone(&gateway), &config.question, config.batch_size),
            evaluator: Evaluator::new(Arc::clone(&gateway)),
            improver: Improver::new(gateway),
            settings: LoopSettings::from(config),
        }
    }

    /// Run the loop, collecting events into the outcome.
    pub async fn run(&self) -> Result<RefinementOutcome> {
        self.run_observed(|_| {}).await
    }

    /// Run the loop, passing each event to `observer` as it happens.
    ///
    /// Parse failures never escape: an unparsable evaluation fails the
    /// whole batch, an unparsable generation or improvement costs the
    /// attempt. Backend errors abort the run.
    pub async fn run_observed<F>(&self, observer: F) -> Result<RefinementOutcome>
    where
        F: FnMut(&RefineEvent),
    {
        let start = Instant::now();
        let max_attempts = self.settings.max_attempts;
        let mut log = EventLog {
            observer,
            events: Vec::new(),
        };
        let mut set = WorkingSet::new();
        let mut stats = RunStats::default();
        let mut consecutive_parse_failures = 0u32;

        while stats.attempts < max_attempts {
            stats.attempts += 1;
            log.emit(RefineEvent::AttemptStarted {
                attempt: stats.attempts,
                max_attempts,
            });

            // 1) Generate the initial batch once
            if set.is_empty() {
                stats.backend_calls += 1;
                match self.generator.generate().await {
                    Ok(items) => {
                        log.emit(RefineEvent::Generated {
                            requested: self.generator.batch_size(),
                            received: items.len(),
                        });
                        set.replace_pending(items);
                        consecutive_parse_failures = 0;
                    }
                    Err(e) if e.is_parse() => {
                        stats.parse_failures += 1;
                        consecutive_parse_failures += 1;
                        log.emit(RefineEvent::GenerationUnparsable {
                            error: e.to_string(),
                        });
                        self.back_off(&stats, consecutive_parse_failures, &mut log)
                            .await;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            // 2) Evaluate pending items and move the passing ones
            if set.has_pending() {
                stats.backend_calls += 1;
                let evaluated = set.pending().len();
                let report = self.evaluator.evaluate(set.pending_mut()).await?;

                match &report.parse_error {
                    Some(error) => {
                        stats.parse_failures += 1;
                        log.emit(RefineEvent::EvaluationUnparsable {
                            evaluated,
                            error: error.clone(),
                        });
                    }
                    None => log.emit(RefineEvent::Evaluated {
                        evaluated,
                        passed: report.passed(),
                        failed: report.failed(),
                        missing: report.missing,
                        matched_by_id: report.correlation == Correlation::ById,
                    }),
                }

                set.partition(&report.verdicts);
            }

            // 3) Replace whatever failed
            if set.has_pending() {
                stats.backend_calls += 1;
                let sent = set.pending().len();
                match self.improver.improve(set.accepted(), set.pending()).await {
                    Ok(improved) => {
                        log.emit(RefineEvent::Improved {
                            sent,
                            received: improved.len(),
                        });
                        set.replace_pending(improved);
                        consecutive_parse_failures = 0;
                    }
                    Err(e) if e.is_parse() => {
                        stats.parse_failures += 1;
                        consecutive_parse_failures += 1;
                        log.emit(RefineEvent::ImprovementUnparsable {
                            error: e.to_string(),
                        });
                        self.back_off(&stats, consecutive_parse_failures, &mut log)
                            .await;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            // 4) Done once nothing is pending
            if !set.has_pending() {
                stats.converged = true;
                log.emit(RefineEvent::Converged {
                    attempts: stats.attempts,
                    accepted: set.accepted().len(),
                });
                break;
            }
        }

        if !stats.converged {
            log.emit(RefineEvent::BudgetExhausted {
                attempts: stats.attempts,
                accepted: set.accepted().len(),
                pending: set.pending().len(),
            });
        }

        stats.total_accepted = set.accepted().len();
        stats.total_pending = set.pending().len();
        stats.runtime_secs = start.elapsed().as_secs_f64();

        Ok(RefinementOutcome {
            items: set.into_items(),
            stats,
            events: log.events,
        })
    }

    /// Sleep before retrying, unless the budget is already spent.
    async fn back_off<F: FnMut(&RefineEvent)>(
        &self,
        stats: &RunStats,
        consecutive: u32,
        log: &mut EventLog<F>,
    ) {
        if stats.attempts >= self.settings.max_attempts {
            return;
        }
        let delay = self.settings.backoff(consecutive);
        if delay.is_zero() {
            return;
        }
        log.emit(RefineEvent::BackingOff {
            delay_ms: delay.as_millis() as u64,
        });
        tokio::time::sleep(delay).await;
    }
}
