// ==========================================
// 志愿者配对系统 - 匹配度评分引擎
// ==========================================
// 职责: 语言/区域重叠评分（配对评分 + 组评分）
// 说明: 评分为召回优先的启发式，并非校准后的统计量
// ==========================================
// pair_score  = 0.5·language_match + 0.5·region_match
// confidence  = 0.5·language_match + 0.5·region_match（按布尔值，不按百分比）
// ==========================================

use crate::domain::client::Client;
use crate::domain::volunteer::Volunteer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ==========================================
// OverlapMatcher - 可替换的重叠判定策略
// ==========================================
pub trait OverlapMatcher: Send + Sync {
    /// 两个词表是否存在任意一项匹配
    fn overlaps(&self, left: &[String], right: &[String]) -> bool;

    fn name(&self) -> &'static str;
}

/// 子串包含匹配（大小写不敏感，任意方向）
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringOverlapMatcher;

impl OverlapMatcher for SubstringOverlapMatcher {
    fn overlaps(&self, left: &[String], right: &[String]) -> bool {
        let right: Vec<String> = normalized(right);
        normalized(left).iter().any(|l| {
            right
                .iter()
                .any(|r| l.contains(r.as_str()) || r.contains(l.as_str()))
        })
    }

    fn name(&self) -> &'static str {
        "substring"
    }
}

/// 精确匹配（大小写不敏感）
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactSetMatcher;

impl OverlapMatcher for ExactSetMatcher {
    fn overlaps(&self, left: &[String], right: &[String]) -> bool {
        let right = normalized(right);
        normalized(left).iter().any(|l| right.contains(l))
    }

    fn name(&self) -> &'static str {
        "exact"
    }
}

// 空白项不参与匹配（空串是任何字符串的子串）
fn normalized(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

// ==========================================
// 评分结果
// ==========================================

/// 志愿者两两评分
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    pub language_match: bool,
    pub region_match: bool,
    pub score: f64, // {0, 0.5, 1.0}
}

/// 配对 × 客户组评分
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupScore {
    pub language_match: bool,
    pub region_match: bool,
    pub language_match_pct: f64,
    pub region_match_pct: f64,
    pub confidence: f64,
    pub total_clients: usize,
}

fn half_weighted(language_match: bool, region_match: bool) -> f64 {
    let mut score = 0.0;
    if language_match {
        score += 0.5;
    }
    if region_match {
        score += 0.5;
    }
    score
}

// ==========================================
// CompatibilityScorer - 匹配度评分引擎
// ==========================================
#[derive(Clone)]
pub struct CompatibilityScorer {
    matcher: Arc<dyn OverlapMatcher>,
}

impl Default for CompatibilityScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl CompatibilityScorer {
    /// 默认使用子串匹配策略
    pub fn new() -> Self {
        Self::with_matcher(Arc::new(SubstringOverlapMatcher))
    }

    pub fn with_matcher(matcher: Arc<dyn OverlapMatcher>) -> Self {
        Self { matcher }
    }

    pub fn matcher_name(&self) -> &'static str {
        self.matcher.name()
    }

    /// 志愿者两两评分
    pub fn pair_score(&self, v1: &Volunteer, v2: &Volunteer) -> PairScore {
        let language_match = self.matcher.overlaps(&v1.languages, &v2.languages);
        let region_match = self.matcher.overlaps(&v1.regions, &v2.regions);
        PairScore {
            language_match,
            region_match,
            score: half_weighted(language_match, region_match),
        }
    }

    /// 配对 × 客户组评分
    ///
    /// 每个客户的语言与配对合并语言表比对，客户区域（location）与配对合并区域表比对。
    /// 百分比 = 匹配客户数 / 客户总数；布尔值 = 匹配客户数 > 0。
    pub fn group_score(&self, v1: &Volunteer, v2: &Volunteer, clients: &[&Client]) -> GroupScore {
        let total = clients.len();
        if total == 0 {
            return GroupScore {
                language_match: false,
                region_match: false,
                language_match_pct: 0.0,
                region_match_pct: 0.0,
                confidence: 0.0,
                total_clients: 0,
            };
        }

        let pair_languages: Vec<String> =
            v1.languages.iter().chain(v2.languages.iter()).cloned().collect();
        let pair_regions: Vec<String> =
            v1.regions.iter().chain(v2.regions.iter()).cloned().collect();

        let mut language_hits = 0usize;
        let mut region_hits = 0usize;
        for client in clients {
            if self.matcher.overlaps(&client.languages, &pair_languages) {
                language_hits += 1;
            }
            if self
                .matcher
                .overlaps(std::slice::from_ref(&client.location), &pair_regions)
            {
                region_hits += 1;
            }
        }

        let language_match = language_hits > 0;
        let region_match = region_hits > 0;
        GroupScore {
            language_match,
            region_match,
            language_match_pct: language_hits as f64 / total as f64,
            region_match_pct: region_hits as f64 / total as f64,
            confidence: half_weighted(language_match, region_match),
            total_clients: total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::VolunteerStatus;

    fn volunteer(languages: &[&str], regions: &[&str]) -> Volunteer {
        Volunteer::new("P1", "V", VolunteerStatus::Selected)
            .with_languages(languages)
            .with_regions(regions)
    }

    #[test]
    fn test_pair_score_language_only() {
        let scorer = CompatibilityScorer::new();
        let v1 = volunteer(&["English", "Tamil"], &["East"]);
        let v2 = volunteer(&["Tamil", "Malay"], &["West"]);

        let score = scorer.pair_score(&v1, &v2);
        assert!(score.language_match);
        assert!(!score.region_match);
        assert_eq!(score.score, 0.5);
    }

    #[test]
    fn test_substring_match_is_case_insensitive_both_directions() {
        let m = SubstringOverlapMatcher;
        assert!(m.overlaps(&["mandarin".to_string()], &["Mandarin Chinese".to_string()]));
        assert!(m.overlaps(&["North-East".to_string()], &["east".to_string()]));
        assert!(!m.overlaps(&["Hokkien".to_string()], &["Malay".to_string()]));
    }

    #[test]
    fn test_blank_tokens_never_match() {
        let m = SubstringOverlapMatcher;
        assert!(!m.overlaps(&["".to_string()], &["English".to_string()]));
        assert!(!m.overlaps(&[], &["English".to_string()]));
    }

    #[test]
    fn test_exact_matcher_rejects_substrings() {
        let scorer = CompatibilityScorer::with_matcher(Arc::new(ExactSetMatcher));
        let v1 = volunteer(&["Mandarin Chinese"], &["East"]);
        let v2 = volunteer(&["mandarin"], &["east"]);
        let score = scorer.pair_score(&v1, &v2);
        assert!(!score.language_match);
        assert!(score.region_match);
        assert_eq!(scorer.matcher_name(), "exact");
    }

    #[test]
    fn test_group_score_confidence_uses_presence_not_density() {
        let scorer = CompatibilityScorer::new();
        let v1 = volunteer(&["English"], &["Central"]);
        let v2 = volunteer(&["Malay"], &["North"]);

        let c1 = Client::new("P1", "C1", "Central").with_languages("Tamil");
        let c2 = Client::new("P1", "C2", "West").with_languages("Hokkien");
        let c3 = Client::new("P1", "C3", "West").with_languages("English, Tamil");
        let c4 = Client::new("P1", "C4", "East").with_languages("Cantonese");

        let score = scorer.group_score(&v1, &v2, &[&c1, &c2, &c3, &c4]);
        assert!(score.language_match);
        assert!(score.region_match);
        assert_eq!(score.language_match_pct, 0.25);
        assert_eq!(score.region_match_pct, 0.25);
        assert_eq!(score.confidence, 1.0);
        assert_eq!(score.total_clients, 4);
    }

    #[test]
    fn test_group_score_empty_group_is_zero() {
        let scorer = CompatibilityScorer::new();
        let v = volunteer(&["English"], &["Central"]);
        let score = scorer.group_score(&v, &v, &[]);
        assert_eq!(score.confidence, 0.0);
        assert_eq!(score.total_clients, 0);
    }
}
