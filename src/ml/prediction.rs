//! 確率ベクトルから推論結果を組み立てる

use crate::error::{ClassifierError, Result};
use crate::guidance::disposal_for_label;
use crate::types::{ClassScores, DisposalInstructions, PredictionResult};

/// この信頼度（%）未満の予測は「不確か」として印を付ける（棄却はしない）
pub const UNCERTAINTY_THRESHOLD: f64 = 60.0;

/// 小数第2位で丸める
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 最大値のインデックス。同値の場合は先頭を優先
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &value) in values.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((i, value)),
        }
    }
    best.map(|(i, _)| i)
}

/// 確率ベクトルを推論結果に変換
///
/// # 引数
/// - `labels`: クラスラベル（学習時の順序）
/// - `probabilities`: softmax出力（ラベルと同じ長さ）
/// - `educational_fact`: 添える豆知識
pub fn build_prediction(
    labels: &[String],
    probabilities: &[f32],
    educational_fact: String,
) -> Result<PredictionResult> {
    if probabilities.len() != labels.len() {
        return Err(ClassifierError::PredictionFailed(format!(
            "出力次元 {} がクラス数 {} と一致しません",
            probabilities.len(),
            labels.len()
        )));
    }
    if let Some(i) = probabilities.iter().position(|p| !p.is_finite()) {
        return Err(ClassifierError::PredictionFailed(format!(
            "クラス {} の出力が有限値ではありません",
            labels[i]
        )));
    }

    let predicted_idx = argmax(probabilities)
        .ok_or_else(|| ClassifierError::PredictionFailed("出力が空です".to_string()))?;
    let predicted_class = labels[predicted_idx].clone();

    let all_predictions = ClassScores(
        labels
            .iter()
            .zip(probabilities)
            .map(|(label, &p)| (label.clone(), p as f64 * 100.0))
            .collect(),
    );

    let confidence = round2(probabilities[predicted_idx] as f64 * 100.0);
    let is_uncertain = confidence < UNCERTAINTY_THRESHOLD;

    let disposal_instructions = DisposalInstructions(disposal_for_label(&predicted_class));

    Ok(PredictionResult {
        predicted_class,
        confidence,
        all_predictions,
        is_uncertain,
        disposal_instructions,
        educational_fact,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        ["cardboard", "glass", "metal", "paper", "plastic", "trash"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_confident_cardboard() {
        let probs = [0.91, 0.01, 0.02, 0.03, 0.02, 0.01];
        let result = build_prediction(&labels(), &probs, "fact".to_string()).unwrap();

        assert_eq!(result.predicted_class, "cardboard");
        assert_eq!(result.confidence, 91.0);
        assert!(!result.is_uncertain);
        assert_eq!(result.disposal_instructions.bin(), Some("Blue Recycling Bin"));
        assert_eq!(result.educational_fact, "fact");
    }

    #[test]
    fn test_scores_cover_every_label_and_sum_to_100() {
        let probs = [0.1, 0.25, 0.05, 0.3, 0.2, 0.1];
        let result = build_prediction(&labels(), &probs, String::new()).unwrap();

        assert_eq!(result.all_predictions.len(), 6);
        for label in labels() {
            assert!(result.all_predictions.get(&label).is_some());
        }
        assert!((result.all_predictions.total() - 100.0).abs() < 0.1);
    }

    #[test]
    fn test_predicted_class_has_max_score() {
        let probs = [0.1, 0.25, 0.05, 0.3, 0.2, 0.1];
        let result = build_prediction(&labels(), &probs, String::new()).unwrap();

        let max = result
            .all_predictions
            .iter()
            .map(|(_, score)| score)
            .fold(f64::MIN, f64::max);
        assert_eq!(result.predicted_class, "paper");
        assert_eq!(result.all_predictions.get("paper"), Some(max));
        assert_eq!(result.confidence, round2(max));
        assert!(result.is_uncertain);
    }

    #[test]
    fn test_threshold_boundary() {
        // 60.00 は確か、59.99 は不確か
        let exact = [0.6, 0.4, 0.0, 0.0, 0.0, 0.0];
        let result = build_prediction(&labels(), &exact, String::new()).unwrap();
        assert_eq!(result.confidence, 60.0);
        assert!(!result.is_uncertain);

        let below = [0.5999, 0.4001, 0.0, 0.0, 0.0, 0.0];
        let result = build_prediction(&labels(), &below, String::new()).unwrap();
        assert_eq!(result.confidence, 59.99);
        assert!(result.is_uncertain);
    }

    #[test]
    fn test_unmapped_label_gets_empty_disposal() {
        let labels = vec!["battery".to_string(), "glass".to_string()];
        let result = build_prediction(&labels, &[0.8, 0.2], String::new()).unwrap();

        assert_eq!(result.predicted_class, "battery");
        assert!(result.disposal_instructions.is_empty());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["disposal_instructions"], serde_json::json!({}));
    }

    #[test]
    fn test_tie_picks_first_label() {
        let probs = [0.3, 0.3, 0.1, 0.1, 0.1, 0.1];
        let result = build_prediction(&labels(), &probs, String::new()).unwrap();
        assert_eq!(result.predicted_class, "cardboard");
    }

    #[test]
    fn test_dimension_mismatch_fails() {
        let err = build_prediction(&labels(), &[0.5, 0.5], String::new()).unwrap_err();
        assert!(matches!(err, ClassifierError::PredictionFailed(_)));
    }

    #[test]
    fn test_nan_output_fails() {
        let probs = [f32::NAN, 0.2, 0.2, 0.2, 0.2, 0.2];
        let err = build_prediction(&labels(), &probs, String::new()).unwrap_err();
        assert!(matches!(err, ClassifierError::PredictionFailed(_)));
    }

    #[test]
    fn test_response_shape() {
        let probs = [0.91, 0.01, 0.02, 0.03, 0.02, 0.01];
        let result = build_prediction(&labels(), &probs, "fact".to_string()).unwrap();
        let json = serde_json::to_value(&result).unwrap();

        for key in [
            "predicted_class",
            "confidence",
            "all_predictions",
            "is_uncertain",
            "disposal_instructions",
            "educational_fact",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json.as_object().unwrap().len(), 6);
    }
}
