use anyhow::Context;
use std::path::PathBuf;
use tradar_core::domain::prediction::AnalysisResult;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputTo {
    Console,
    File,
}

/// Where successful analyses go as they arrive.
#[derive(Debug)]
pub enum Sink {
    Console,
    /// Rewrites the whole file after every message so a crash keeps what
    /// was already extracted.
    File {
        path: PathBuf,
        written: Vec<AnalysisResult<Uuid>>,
    },
}

impl Sink {
    pub fn new(output_to: OutputTo, path: PathBuf) -> Self {
        match output_to {
            OutputTo::Console => Self::Console,
            OutputTo::File => Self::File {
                path,
                written: Vec::new(),
            },
        }
    }

    pub fn accept(&mut self, position: usize, result: &AnalysisResult<Uuid>) -> anyhow::Result<()> {
        match self {
            Self::Console => {
                println!("{}", render_console(position, result));
                Ok(())
            }
            Self::File { path, written } => {
                written.push(result.clone());
                let json = serde_json::to_string_pretty(written)
                    .context("failed to serialize analysis results")?;
                std::fs::write(&*path, json)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                tracing::info!(position = position + 1, path = %path.display(), "analysis results written");
                Ok(())
            }
        }
    }
}

fn render_console(position: usize, result: &AnalysisResult<Uuid>) -> String {
    let mut out = format!("### Message {} ###", position + 1);
    for (i, p) in result.predictions().iter().enumerate() {
        out.push_str(&format!(
            "\n--- Prediction {} ---\
             \n  Message ID: {}\
             \n  Prediction Type: {}\
             \n  Ticker: {}\
             \n  Target Price: {}\
             \n  Target Change Percent: {}\
             \n  Period: {}\
             \n  Recommendation: {}\
             \n  Direction: {}\
             \n  Justification Text: {}",
            i + 1,
            p.message_id,
            p.prediction_type,
            p.ticker,
            p.target_price,
            p.target_change_percent,
            p.period,
            p.recommendation,
            p.direction,
            p.justification_text,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradar_core::domain::prediction::PredictionRecord;
    use tradar_core::domain::scalar::FlexibleScalar;

    fn result(ticker: &str) -> AnalysisResult<Uuid> {
        AnalysisResult::new(vec![PredictionRecord {
            message_id: Uuid::nil(),
            prediction_type: "Продолжение тренда".to_string(),
            ticker: ticker.to_string(),
            target_price: FlexibleScalar::Numeric(150.0),
            target_change_percent: FlexibleScalar::Text("10%".to_string()),
            period: "Краткосрочный".to_string(),
            recommendation: "Покупать".to_string(),
            direction: "Лонг".to_string(),
            justification_text: "цель 150".to_string(),
        }])
        .unwrap()
    }

    #[test]
    fn console_rendering_uses_display_forms() {
        let text = render_console(0, &result("XYZ"));
        assert!(text.starts_with("### Message 1 ###"));
        assert!(text.contains("Target Price: 150.00"));
        assert!(text.contains("Target Change Percent: 10%"));
    }

    #[test]
    fn file_sink_rewrites_accumulated_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis_results.json");
        let mut sink = Sink::new(OutputTo::File, path.clone());

        sink.accept(0, &result("SBER")).unwrap();
        sink.accept(1, &result("GAZP")).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let entries = written.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1]["predictions"][0]["ticker"], "GAZP");
        assert_eq!(entries[0]["predictions"][0]["target_price"], 150.0);
    }
}
