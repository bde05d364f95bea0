use crate::domain::scalar::FlexibleScalar;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// Closed vocabularies the model is instructed to answer with. Labels are the
// exact strings that appear in the prompt and in stored rows.
macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:tt),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Case-insensitive lookup of a label as the model wrote it.
            pub fn from_label(s: &str) -> Option<Self> {
                let wanted = s.trim().to_lowercase();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.label().to_lowercase() == wanted)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

vocabulary!(
    /// Nature of the forecast.
    PredictionType {
        TrendContinuation => "Продолжение тренда",
        Reversal => "Разворот",
        CorrectedTarget => "Цель с коррекцией",
        PreBreakoutAccumulation => "Накопление перед пробоем",
        LongTermPessimism => "Долгосрочный пессимизм",
        Undetermined => "Неопределенный",
    }
);

vocabulary!(
    /// Time window the forecast applies to.
    Horizon {
        Today => "Сегодня",
        ShortTerm => "Краткосрочный",
        MediumTerm => "Среднесрочный",
        LongTerm => "Долгосрочный",
        Undetermined => "Неопределенный",
    }
);

vocabulary!(
    Recommendation {
        Buy => "Покупать",
        Sell => "Продавать",
        Hold => "Держать",
        Undetermined => "Неопределенный",
    }
);

vocabulary!(
    Direction {
        Long => "Лонг",
        Short => "Шорт",
        Undetermined => "Неопределенный",
    }
);

/// One extracted forecast. Text fields keep whatever the model wrote, with
/// the empty string meaning "absent"; typed views are available through the
/// `*_kind` accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord<I = Uuid> {
    pub message_id: I,
    pub prediction_type: String,
    pub ticker: String,
    pub target_price: FlexibleScalar,
    pub target_change_percent: FlexibleScalar,
    pub period: String,
    pub recommendation: String,
    pub direction: String,
    pub justification_text: String,
}

impl<I> PredictionRecord<I> {
    pub fn prediction_type_kind(&self) -> Option<PredictionType> {
        PredictionType::from_label(&self.prediction_type)
    }

    pub fn horizon(&self) -> Option<Horizon> {
        Horizon::from_label(&self.period)
    }

    pub fn recommendation_kind(&self) -> Option<Recommendation> {
        Recommendation::from_label(&self.recommendation)
    }

    pub fn direction_kind(&self) -> Option<Direction> {
        Direction::from_label(&self.direction)
    }

    /// No ticker and an undetermined prediction type: nothing worth keeping.
    pub fn is_degenerate(&self) -> bool {
        self.ticker.trim().is_empty()
            && self.prediction_type_kind() == Some(PredictionType::Undetermined)
    }
}

/// Predictions extracted from a single message. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult<I = Uuid> {
    predictions: Vec<PredictionRecord<I>>,
}

impl<I> AnalysisResult<I> {
    pub fn new(predictions: Vec<PredictionRecord<I>>) -> Option<Self> {
        if predictions.is_empty() {
            return None;
        }
        Some(Self { predictions })
    }

    pub fn predictions(&self) -> &[PredictionRecord<I>] {
        &self.predictions
    }

    pub fn into_predictions(self) -> Vec<PredictionRecord<I>> {
        self.predictions
    }

    pub fn message_id(&self) -> &I {
        &self.predictions[0].message_id
    }

    /// Keeps records matching `keep`; `None` when nothing survives.
    pub fn retain(mut self, keep: impl FnMut(&PredictionRecord<I>) -> bool) -> Option<Self> {
        self.predictions.retain(keep);
        Self::new(self.predictions)
    }
}
