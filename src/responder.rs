/// Detection response: turns one classification vector into an outcome code.
use crate::defaults::CATEGORY_COUNT;
use crate::inference::Scores;

/// One byte per classification: the winning category index, or
/// [`NO_DETECTION`].
pub type OutcomeCode = u8;

/// Winning score was below the confidence threshold.
pub const NO_DETECTION: OutcomeCode = 0xFF;

/// Called once per classification. Implementations may signal something
/// outside the pipeline (an LED, a log line) as a side effect.
pub trait DetectionResponder {
    fn respond(&mut self, scores: &Scores, labels: &[&str; CATEGORY_COUNT]) -> OutcomeCode;
}

/// Picks the highest-scoring category.
pub struct ArgmaxResponder {
    min_confidence: f32,
}

impl ArgmaxResponder {
    pub const fn new(min_confidence: f32) -> Self {
        Self { min_confidence }
    }
}

impl DetectionResponder for ArgmaxResponder {
    fn respond(&mut self, scores: &Scores, labels: &[&str; CATEGORY_COUNT]) -> OutcomeCode {
        let Some((idx, best)) = argmax(scores) else {
            return NO_DETECTION;
        };
        if best < self.min_confidence {
            log::debug!("No gesture ({} at {:.2})", labels[idx], best);
            return NO_DETECTION;
        }
        log::info!("Detected {} ({:.0}%)", labels[idx], best * 100.0);
        idx as OutcomeCode
    }
}

/// Index and value of the largest score. NaNs never win.
pub fn argmax(scores: &Scores) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, s)| !s.is_nan())
        .fold(None, |best, (i, s)| match best {
            Some((_, b)) if b >= s => best,
            _ => Some((i, s)),
        })
}
