use crate::domain::prediction::{Direction, Horizon, PredictionType, Recommendation};
use std::fmt;

/// Renders the instruction sent to the model for one message.
///
/// Vocabulary lines are generated from the domain enums so the prompt and
/// the typed views never drift apart.
pub fn build_prompt(message: &str, channel: &str, message_id: &impl fmt::Display) -> String {
    let mut lines = vec![
        "Ты опытный финансовый аналитик. Извлеки из сообщения прогнозы по акциям и структурируй их в формате JSON.".to_string(),
        "Если какое-либо значение (например, целевая цена или период) отсутствует, используй null.".to_string(),
        "Формат ответа: JSON-массив, содержащий один или несколько объектов. Каждый объект должен иметь поля:".to_string(),
        format!("- message_id: идентификатор сообщения ({message_id})."),
        format!(
            "- prediction_type: тип прогноза, один из вариантов: {}.",
            choices(PredictionType::ALL)
        ),
        "- ticker: тикер акции из сообщения (например, AFLT). Если тикер не найден, используй пустую строку.".to_string(),
        format!(
            "- period: временной горизонт прогноза, один из вариантов: {}.",
            choices(Horizon::ALL)
        ),
        "- target_price: целевая цена числом. Если указан диапазон, используй строку, например \"60-65\". Если цена не указана, используй null.".to_string(),
        "- target_change_percent: целевое изменение цены в процентах числом или строкой с диапазоном, например \"7-8%\". Если процент не указан, используй null.".to_string(),
        format!(
            "- recommendation: рекомендация автора, один из вариантов: {}.",
            choices(Recommendation::ALL)
        ),
        format!(
            "- direction: направление сделки, один из вариантов: {}.",
            choices(Direction::ALL)
        ),
        "- justification_text: дословная цитата из сообщения, которая подтверждает прогноз.".to_string(),
        String::new(),
    ];

    let channel = channel.trim();
    if !channel.is_empty() {
        lines.push(format!("Канал: {channel}"));
    }
    lines.push(format!("Сообщение: {}", message.trim()));
    lines.push(String::new());
    lines.push("Отвечай только JSON, без дополнительного текста и без markdown.".to_string());

    lines.join("\n")
}

fn choices<T: fmt::Display>(all: &[T]) -> String {
    all.iter()
        .map(|v| format!("\"{v}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerates_every_vocabulary_label() {
        let prompt = build_prompt("Акция XYZ, цель 150", "Канал трейдера", &"id-1");
        for t in PredictionType::ALL {
            assert!(prompt.contains(&format!("\"{t}\"")), "missing {t}");
        }
        for h in Horizon::ALL {
            assert!(prompt.contains(&format!("\"{h}\"")), "missing {h}");
        }
        for r in Recommendation::ALL {
            assert!(prompt.contains(&format!("\"{r}\"")), "missing {r}");
        }
        for d in Direction::ALL {
            assert!(prompt.contains(&format!("\"{d}\"")), "missing {d}");
        }
    }

    #[test]
    fn embeds_message_channel_and_identifier() {
        let prompt = build_prompt("  Акция XYZ, цель 150  ", "Канал трейдера", &42);
        assert!(prompt.contains("Сообщение: Акция XYZ, цель 150\n"));
        assert!(prompt.contains("Канал: Канал трейдера"));
        assert!(prompt.contains("(42)"));
        assert!(prompt.ends_with("Отвечай только JSON, без дополнительного текста и без markdown."));
    }

    #[test]
    fn omits_blank_channel() {
        let prompt = build_prompt("text", "   ", &1);
        assert!(!prompt.contains("Канал:"));
    }
}
