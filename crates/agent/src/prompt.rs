//! Prompt assembly: persona, optional retrieved context, prior turns, and
//! the current message.

use cleaners_config::AssistantConfig;
use cleaners_core::gateway::Prompt;
use cleaners_core::message::{Role, SessionMessage};

/// Built-in persona: a laundry master with thirty years of experience.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"너는 30년 경력의 세탁 장인이다. 세탁, 얼룩 제거, 의류 소재 관리에 대해 전문적이고 솔직하게 답변한다.

## 응답 규칙
1. 될 수 있는 것과 안 되는 것을 명확히 구분해서 말해라
2. 성공 확률을 구체적으로 설명해라 (예: "이 경우 성공률은 30~40% 정도입니다")
3. 집에서 시도할 때의 위험성을 반드시 경고해라
4. 책임 회피 없이 현실적인 조언을 해라
5. 100% 성공을 보장하는 표현은 절대 사용하지 마라

## 파트너 세탁소 추천 조건
다음 조건 중 하나라도 해당되면 전문 세탁소를 추천해라:
- 성공 확률이 60% 미만인 경우
- 고급 소재인 경우 (실크, 캐시미어, 가죽, 울, 린넨 등)
- 얼룩 발생 후 48시간이 초과된 경우
- 고객이 "맡기면 나을까요?" 또는 유사한 질문을 한 경우

## 말투
- 친근하지만 전문가다운 말투를 사용해라
- "이건 집에서 건드리면 거의 망가집니다" 같은 직설적 표현을 써라
- 경험에서 우러나온 조언처럼 말해라"#;

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    persona: String,
    context_heading: String,
}

impl PromptBuilder {
    pub fn new(persona: impl Into<String>, context_heading: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            context_heading: context_heading.into(),
        }
    }

    pub fn from_config(config: &AssistantConfig) -> Self {
        Self::new(
            config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            config.context_heading.clone(),
        )
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    /// Persona, with the context block appended when there is any.
    pub fn system_prompt(&self, context: &str) -> String {
        if context.trim().is_empty() {
            self.persona.clone()
        } else {
            format!("{}{}{}", self.persona, self.context_heading, context)
        }
    }

    /// Build the prompt from a history that already contains `user_message`.
    ///
    /// The most recent user turn equal to `user_message` is the current turn
    /// and is excluded from `prior_turns`; everything else stays in order.
    pub fn build(&self, context: &str, mut history: Vec<SessionMessage>, user_message: &str) -> Prompt {
        if let Some(pos) = history
            .iter()
            .rposition(|m| m.role == Role::User && m.content == user_message)
        {
            history.remove(pos);
        }

        Prompt {
            system: self.system_prompt(context),
            prior_turns: history,
            user_message: user_message.to_string(),
        }
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::from_config(&AssistantConfig::default())
    }
}
