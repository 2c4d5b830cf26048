//! # Mock Analysis
//!
//! Complete placeholder report produced when no model backend is
//! configured. The scores go through the same rubric as a real run, with
//! the default tables, and always total 70.

use chrono::Utc;

use super::result::{AggregateResult, AnalysisMetadata};
use crate::skills::context::AnalysisRequest;
use crate::skills::llm_helpers::excerpt;
use crate::skills::market_analysis_skill::{MarketAnalysisResult, MarketDataMode, MarketOverview};
use crate::skills::scoring_skill::{
    Competitors, MarketSize, ScoreInput, ScoringConfig, ScoringResult,
};
use crate::skills::strategy_skill::{ActionItem, Recommendations, StrategyResult};
use crate::skills::summary_skill::SummaryResult;
use crate::skills::target_user_skill::{Persona, TargetUserResult, TargetUsers};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Build the mock report for a request
pub fn mock_analysis(request: &AnalysisRequest) -> AggregateResult {
    let idea = excerpt(&request.idea, 80);

    let dimensions = [
        (21, "예시 분석: 시장 규모 데이터를 연결하면 실제 평가가 제공됩니다."),
        (18, "예시 분석: 해결하려는 문제가 비교적 명확합니다."),
        (13, "예시 분석: 경쟁 서비스 대비 차별점 검증이 필요합니다."),
        (11, "예시 분석: 소규모 팀으로 MVP 구현이 가능한 수준입니다."),
        (7, "예시 분석: 수익 모델 구체화가 필요합니다."),
    ]
    .map(|(score, reason)| (score, reason.to_string()));

    let score = ScoringResult::from_input(
        &ScoringConfig::default(),
        ScoreInput {
            dimensions,
            market_size: MarketSize {
                tam: "예시: 약 1조 원".to_string(),
                sam: "예시: 약 1,000억 원".to_string(),
                som: "예시: 약 50억 원".to_string(),
            },
            competitors: Competitors {
                direct: strings(&["예시 경쟁사 A"]),
                indirect: strings(&["기존 오프라인 대안"]),
            },
            business_type: "B2C 서비스".to_string(),
            revenue_model: "이용료 + 제휴 광고".to_string(),
            weak_areas: None,
            comment: format!(
                "'{}' 아이디어에 대한 예시 평가입니다. AI 분석이 활성화되면 실제 평가로 대체됩니다.",
                idea
            ),
        },
    );

    AggregateResult {
        summary: SummaryResult {
            summary: format!("'{}' 아이디어의 예시 요약입니다.", idea),
            core_value: "사용자의 불편을 간편하게 해결하는 서비스".to_string(),
            problem_statement: "기존 대안이 번거롭고 접근성이 낮다는 문제".to_string(),
        },
        target_user: TargetUserResult {
            target_users: TargetUsers {
                primary: "20-40대 도시 거주 직장인".to_string(),
                characteristics: strings(&["모바일 앱 사용에 익숙함", "시간 절약을 중시함"]),
                personas: vec![Persona {
                    name: "김민준 (32세, 회사원)".to_string(),
                    description: "출퇴근 시간에 모바일로 대부분의 일을 처리하는 사용자".to_string(),
                }],
            },
            pain_points: strings(&["필요한 순간에 대안이 없음", "기존 방식의 높은 비용"]),
            goals: strings(&["빠르고 저렴하게 문제 해결"]),
        },
        market_analysis: MarketAnalysisResult {
            market_analysis: MarketOverview {
                potential: "예시: 성장 가능성이 있는 시장입니다.".to_string(),
                market_size: "예시: 약 1조 원 규모".to_string(),
                trends: "예시: 모바일 중심 서비스 확산".to_string(),
                competitors: strings(&["예시 경쟁사 A", "예시 경쟁사 B"]),
                differentiation: "예시: 접근성과 편의성 중심의 차별화".to_string(),
            },
            opportunities: strings(&["초기 시장 선점", "제휴를 통한 빠른 확장"]),
            risks: strings(&["대형 사업자의 진입", "초기 사용자 확보 비용"]),
            data_source: MarketDataMode::Ungrounded,
        },
        strategy: StrategyResult {
            recommendations: Recommendations {
                mvp_features: strings(&["핵심 기능 1개에 집중한 모바일 앱", "간편 결제", "사용 후기"]),
                challenges: strings(&["초기 사용자 확보", "운영 비용 관리"]),
                next_steps: strings(&["고객 인터뷰", "랜딩 페이지 제작", "파일럿 운영"]),
            },
            actions: vec![
                ActionItem {
                    title: "고객 인터뷰".to_string(),
                    description: "타겟 고객 10명을 만나 문제의 심각도를 확인하세요.".to_string(),
                },
                ActionItem {
                    title: "경쟁 서비스 조사".to_string(),
                    description: "유사 서비스 3개를 직접 사용해 보고 차별점을 정리하세요.".to_string(),
                },
                ActionItem {
                    title: "랜딩 페이지 테스트".to_string(),
                    description: "사전 신청 페이지로 수요를 측정하세요.".to_string(),
                },
            ],
        },
        score,
        analyzed_at: Utc::now(),
        metadata: AnalysisMetadata::from_failures(0),
    }
}
