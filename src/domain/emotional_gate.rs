//! Self-report questionnaire shown before the trade-entry form.

use std::collections::BTreeMap;
use std::str::FromStr;

use super::error::SentinelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateQuestion {
    pub prompt: &'static str,
    pub hint: &'static str,
}

pub const QUESTIONS: [GateQuestion; 4] = [
    GateQuestion {
        prompt: "Are you trying to recover a recent loss?",
        hint: "Revenge trading leads to ruin. Accept the loss and reset.",
    },
    GateQuestion {
        prompt: "Do you feel urged to trade immediately?",
        hint: "FOMO isn't a strategy. Wait for your setup.",
    },
    GateQuestion {
        prompt: "Are you distracted or angry?",
        hint: "Emotional baseline must be neutral before engaging.",
    },
    GateQuestion {
        prompt: "Did you deviate from your plan on the last trade?",
        hint: "Discipline is a muscle. Don't compound errors.",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
}

impl FromStr for Answer {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yes" => Ok(Answer::Yes),
            "no" => Ok(Answer::No),
            other => Err(SentinelError::invalid(
                "answer",
                format!("expected yes or no, got '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateResult {
    Pass,
    Fail,
}

/// Any "yes" fails the gate. Every question must be answered.
pub fn evaluate(answers: &BTreeMap<usize, Answer>) -> Result<GateResult, SentinelError> {
    if let Some(index) = answers.keys().find(|&&i| i >= QUESTIONS.len()) {
        return Err(SentinelError::invalid(
            "answers",
            format!("question {index} does not exist"),
        ));
    }
    if answers.len() < QUESTIONS.len() {
        return Err(SentinelError::invalid(
            "answers",
            "every question must be answered",
        ));
    }

    if answers.values().any(|a| *a == Answer::Yes) {
        Ok(GateResult::Fail)
    } else {
        Ok(GateResult::Pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers(values: [Answer; 4]) -> BTreeMap<usize, Answer> {
        values.into_iter().enumerate().collect()
    }

    #[test]
    fn all_no_passes() {
        let result = evaluate(&answers([Answer::No; 4])).unwrap();
        assert_eq!(result, GateResult::Pass);
    }

    #[test]
    fn any_yes_fails() {
        for i in 0..4 {
            let mut values = [Answer::No; 4];
            values[i] = Answer::Yes;
            assert_eq!(evaluate(&answers(values)).unwrap(), GateResult::Fail);
        }
    }

    #[test]
    fn incomplete_answers_are_rejected() {
        let mut partial = BTreeMap::new();
        partial.insert(0, Answer::No);
        partial.insert(2, Answer::No);
        assert!(evaluate(&partial).is_err());
    }

    #[test]
    fn unknown_question_is_rejected() {
        let mut extra = answers([Answer::No; 4]);
        extra.insert(7, Answer::No);
        assert!(evaluate(&extra).is_err());
    }

    #[test]
    fn answers_parse_case_insensitively() {
        assert_eq!("YES".parse::<Answer>().unwrap(), Answer::Yes);
        assert_eq!(" no ".parse::<Answer>().unwrap(), Answer::No);
        assert!("maybe".parse::<Answer>().is_err());
    }
}
