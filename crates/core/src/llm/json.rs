use crate::domain::contract::LlmPrediction;
use crate::domain::prediction::AnalysisResult;
use crate::llm::error::ExtractionError;

/// Removes a surrounding Markdown fence (```json ... ``` or ``` ... ```).
///
/// The opening line is dropped only when it holds a bare info string; a
/// payload written on the fence line is kept for the locator.
pub fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let inner = match rest.split_once('\n') {
        Some((info, body)) if is_info_string(info) => body,
        Some(_) => rest,
        None if is_info_string(rest) => "",
        None => rest,
    };
    let inner = inner.trim_end();
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn is_info_string(line: &str) -> bool {
    let line = line.trim();
    !line.contains(|c| c == '{' || c == '[') && !line.contains(char::is_whitespace)
}

/// Best-effort span of the JSON payload: from the first `{` or `[`
/// (whichever comes first) to the last matching closer. Brackets inside
/// surrounding prose can widen the span; the decoder rejects such spans.
pub fn locate_payload(text: &str) -> Result<&str, ExtractionError> {
    let content = strip_fence(text);

    let (start, close) = match (content.find('{'), content.find('[')) {
        (Some(brace), Some(bracket)) if brace < bracket => (brace, '}'),
        (Some(brace), None) => (brace, '}'),
        (_, Some(bracket)) => (bracket, ']'),
        (None, None) => {
            return Err(ExtractionError::NoJsonFound {
                content: content.to_string(),
            })
        }
    };

    match content.rfind(close) {
        Some(end) if end > start => Ok(&content[start..=end]),
        _ => Err(ExtractionError::NoJsonFound {
            content: content.to_string(),
        }),
    }
}

/// Decodes an isolated payload into predictions stamped with `message_id`.
///
/// Accepts an array of prediction objects or a single bare object. An
/// explicit empty array is a failure, not an empty result.
pub fn decode_predictions<I: Clone>(
    payload: &str,
    message_id: I,
) -> Result<AnalysisResult<I>, ExtractionError> {
    let payload = payload.trim();
    if payload.is_empty() || payload == "null" {
        return Err(ExtractionError::EmptyPayload);
    }

    let decode_failure = |source| ExtractionError::DecodeFailure {
        source,
        content: payload.to_string(),
    };

    // Branch on the JSON shape first: a derived struct would also accept a
    // sequence positionally.
    let value: serde_json::Value = serde_json::from_str(payload).map_err(decode_failure)?;
    let parsed = match value {
        items @ serde_json::Value::Array(_) => {
            serde_json::from_value::<Vec<LlmPrediction>>(items).map_err(decode_failure)?
        }
        single @ serde_json::Value::Object(_) => {
            tracing::debug!("model returned a bare object instead of an array");
            vec![serde_json::from_value::<LlmPrediction>(single).map_err(decode_failure)?]
        }
        other => {
            return Err(decode_failure(<serde_json::Error as serde::de::Error>::custom(format!(
                "expected a prediction array or object, got {other}"
            ))))
        }
    };

    tracing::debug!(count = parsed.len(), "decoded prediction objects");

    let records = parsed
        .into_iter()
        .map(|p| p.into_record(message_id.clone()))
        .collect();

    AnalysisResult::new(records).ok_or_else(|| ExtractionError::NoPredictions {
        content: payload.to_string(),
    })
}

/// Full reply handling: fence stripping, payload location, decoding.
pub fn parse_reply<I: Clone>(
    reply: &str,
    message_id: I,
) -> Result<AnalysisResult<I>, ExtractionError> {
    let content = strip_fence(reply);
    if content.is_empty() || content == "null" {
        return Err(ExtractionError::EmptyPayload);
    }

    let payload = locate_payload(content)?;
    tracing::debug!(payload_len = payload.len(), payload, "located JSON payload");
    decode_predictions(payload, message_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::prediction::PredictionRecord;
    use crate::domain::scalar::FlexibleScalar;
    use serde_json::json;

    fn prediction_json(ticker: &str) -> serde_json::Value {
        json!({
            "message_id": "e7792424-c1d7-4141-a1883b6ad47f",
            "prediction_type": "Продолжение тренда",
            "ticker": ticker,
            "period": "Краткосрочный",
            "target_price": null,
            "target_change_percent": null,
            "recommendation": "Покупать",
            "direction": "Лонг",
            "justification_text": "Автор уверен в продолжении тренда",
        })
    }

    #[test]
    fn strip_fence_handles_fenced_blocks() {
        let body = "[{\"a\":1}]";
        assert_eq!(strip_fence(&format!("```json\n{body}\n```\n")), body);
        assert_eq!(strip_fence(&format!("```\n{body}\n```")), body);
        assert_eq!(strip_fence(&format!("  {body}  ")), body);
    }

    #[test]
    fn strip_fence_keeps_payload_on_the_opening_line() {
        let body = "[{\"ticker\":\"XYZ\"}]";
        assert_eq!(strip_fence(&format!("```{body}\n```")), body);
        assert_eq!(strip_fence(&format!("```{body}```")), body);
        assert_eq!(strip_fence("```json"), "");
    }

    #[test]
    fn locate_payload_isolates_fenced_array_inside_prose() {
        let array = "[{\"ticker\":\"XYZ\"}]";
        let text = format!("Here is the result:\n```json\n{array}\n```\nThanks");
        assert_eq!(locate_payload(&text).unwrap(), array);
    }

    #[test]
    fn locate_payload_falls_back_to_braces() {
        let s = "prefix {\"a\":1} suffix";
        assert_eq!(locate_payload(s).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn locate_payload_prefers_whichever_opener_comes_first() {
        assert_eq!(locate_payload("[{\"a\":[1]}]").unwrap(), "[{\"a\":[1]}]");
        assert_eq!(locate_payload("{\"a\":[1]} tail").unwrap(), "{\"a\":[1]}");
    }

    #[test]
    fn locate_payload_fails_without_json() {
        let err = locate_payload("Прогнозов в сообщении нет.").unwrap_err();
        assert!(matches!(err, ExtractionError::NoJsonFound { .. }));

        let err = locate_payload("} reversed {").unwrap_err();
        assert!(matches!(err, ExtractionError::NoJsonFound { .. }));

        let err = locate_payload("[ never closed").unwrap_err();
        assert!(matches!(err, ExtractionError::NoJsonFound { .. }));
    }

    #[test]
    fn decode_rejects_empty_and_null_payloads() {
        for payload in ["", "null", "  null "] {
            let err = decode_predictions(payload, 1_u32).unwrap_err();
            assert!(matches!(err, ExtractionError::EmptyPayload), "{payload:?}");
        }
    }

    #[test]
    fn decode_rejects_empty_array() {
        let err = decode_predictions("[]", 1_u32).unwrap_err();
        assert!(matches!(err, ExtractionError::NoPredictions { .. }));
    }

    #[test]
    fn decode_accepts_single_object() {
        let payload = prediction_json("AFLT").to_string();
        let result = decode_predictions(&payload, "caller-id".to_string()).unwrap();
        assert_eq!(result.predictions().len(), 1);
        assert_eq!(result.predictions()[0].ticker, "AFLT");
        assert_eq!(result.message_id(), "caller-id");
    }

    #[test]
    fn decode_reports_structural_errors_with_content() {
        let err = decode_predictions("{not a valid json}", 1_u32).unwrap_err();
        match err {
            ExtractionError::DecodeFailure { content, .. } => {
                assert_eq!(content, "{not a valid json}")
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = decode_predictions("[{\"target_price\": true}]", 1_u32).unwrap_err();
        assert!(err.to_string().contains("could not decode scalar"));
    }

    #[test]
    fn decode_rejects_arrays_of_non_objects_and_bad_scalars() {
        let bad_scalar = json!([{"ticker": "SBER", "target_price": true}]).to_string();
        let bad_ticker = json!([{"ticker": 12}]).to_string();
        for payload in ["[\"junk\"]", "[1, 2]", bad_scalar.as_str(), bad_ticker.as_str()] {
            let err = decode_predictions(payload, 7_u32).unwrap_err();
            match err {
                ExtractionError::DecodeFailure { content, .. } => assert_eq!(content, payload),
                other => panic!("{payload}: unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn decode_rejects_non_container_json() {
        for payload in ["42", "\"text\"", "true"] {
            let err = decode_predictions(payload, 1_u32).unwrap_err();
            assert_eq!(err.stage(), "decode", "{payload}");
        }
    }

    #[test]
    fn decode_tolerates_off_vocabulary_answers_and_bogus_ids() {
        let mut long_term = prediction_json("SOL");
        long_term["prediction_type"] = json!("Долгосрочный");
        long_term["period"] = json!("Неопределенный");
        let payload = json!([prediction_json("AFLT"), long_term]).to_string();

        let result = decode_predictions(&payload, 99_i64).unwrap();
        let predictions = result.predictions();
        assert_eq!(predictions.len(), 2);
        assert!(predictions.iter().all(|p| p.message_id == 99));
        assert_eq!(predictions[1].prediction_type, "Долгосрочный");
        assert!(predictions[0].target_price.is_null());
        assert_eq!(predictions[0].target_price.to_string(), "");
        assert!(predictions[0]
            .justification_text
            .contains("продолжении тренда"));
    }

    #[test]
    fn encoded_records_decode_back_unchanged() {
        let records = vec![
            PredictionRecord {
                message_id: 5_u32,
                prediction_type: "Цель с коррекцией".to_string(),
                ticker: "SBER".to_string(),
                target_price: FlexibleScalar::Text("60-65".to_string()),
                target_change_percent: FlexibleScalar::Numeric(7.5),
                period: "Среднесрочный".to_string(),
                recommendation: "Держать".to_string(),
                direction: "Лонг".to_string(),
                justification_text: "цель 60-65".to_string(),
            },
            PredictionRecord {
                message_id: 5_u32,
                prediction_type: "Разворот".to_string(),
                ticker: "GAZP".to_string(),
                target_price: FlexibleScalar::Numeric(150.0),
                target_change_percent: FlexibleScalar::Null,
                period: "Сегодня".to_string(),
                recommendation: "Продавать".to_string(),
                direction: "Шорт".to_string(),
                justification_text: String::new(),
            },
        ];

        let as_array = serde_json::to_string(&records).unwrap();
        let decoded = decode_predictions(&as_array, 5_u32).unwrap();
        assert_eq!(decoded.predictions(), records.as_slice());

        let as_object = serde_json::to_string(&records[0]).unwrap();
        let decoded = decode_predictions(&as_object, 5_u32).unwrap();
        assert_eq!(decoded.into_predictions(), vec![records[0].clone()]);
    }

    #[test]
    fn parse_reply_short_circuits_empty_replies() {
        for reply in ["", "   ", "null", "```json\nnull\n```"] {
            let err = parse_reply(reply, 1_u32).unwrap_err();
            assert!(matches!(err, ExtractionError::EmptyPayload), "{reply:?}");
        }
    }

    #[test]
    fn parse_reply_accepts_json_on_the_fence_line() {
        let reply = format!("```{}\n```", json!([prediction_json("XYZ")]));
        let result = parse_reply(&reply, 1_u32).unwrap();
        assert_eq!(result.predictions().len(), 1);
        assert_eq!(result.predictions()[0].ticker, "XYZ");
    }

    #[test]
    fn parse_reply_handles_prose_wrapped_array() {
        let reply = format!(
            "Вот результат:\n```json\n{}\n```\nЕсли нужно, уточню.",
            json!([prediction_json("MOEX")])
        );
        let result = parse_reply(&reply, 3_u8).unwrap();
        assert_eq!(result.predictions()[0].ticker, "MOEX");
        assert_eq!(*result.message_id(), 3);
    }
}
