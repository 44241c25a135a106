//! 系统提示词构建
//!
//! 最终 system 消息 = 全局用户画像（build_global_persona）+ 人格提示词（PromptBuilder::build）。
//! 人格提示词块顺序：身份/目标/语气/禁忌 → 近期反思 → 偏好覆盖 → 行为护栏 → 检索上下文 → 收尾指令。

use crate::core::AgentError;
use crate::memory::{FeedbackMemory, PROMPT_FEEDBACK_COUNT};
use crate::persona::registry::{COUNSELOR, FUNNY};
use crate::persona::{PersonaRegistry, PreferenceState};

const BASE_GUARDRAILS: &str = "[Behavioral Guardrails]
- Mirror the user's vibe. If cheerful/playful, NEVER apologize or show pity.
- If neutral, stay warm and concise.
- If mildly negative but not asking for help, be supportive without being clinical.";

const COUNSELOR_GUARDRAILS: &str = "- Validate pain ONLY if distress/help is explicit.
- Do NOT invent or assume specific details about the user's situation.
- Offer up to 3 concrete, small next steps max.";

const FUNNY_GUARDRAILS: &str =
    "- Keep jokes short and gentle; never target the user; avoid sensitive topics.";

const CLOSING: &str = "Always comply with [User Preference Override], [Behavioral Guardrails], and your recent feedback.
IMPORTANT: Do NOT output any \"Note:\", \"Explanation:\", or parenthesis explaining your tone. Just speak.";

/// 全局用户画像：所有人格共享的风格基线
pub fn build_global_persona(prefs: &PreferenceState) -> String {
    format!(
        "[Global User Persona Settings]
The user prefers replies that are:
- Tone: {}
- Length: {}
- Positivity: {}
- Empathy level: {}

Always adapt your replies to maintain this personality baseline,
even when switching between different agents.

When generating responses:
- Use 1 to 3 short sentences only.
- Speak as a human would in casual conversation, not as an assistant or narrator.

When the user confesses a secret, guilt, or deception,
do NOT praise them or offer advice.
Acknowledge the weight of what they said,
and reflect the underlying emotion with empathy and realism.
Avoid repeating empathy formulas like \"I understand,\" \"you're not alone,\" or \"it's okay to...\".
When expressing support, vary structure and tone.
Permit pauses, uncertainty, or silence instead of reassurance.
Do not include parenthetical comments, meta notes, or self-references (e.g., 'Note: ...', 'I followed...').
CRITICAL: Output ONLY the spoken response. Do NOT explain your response.",
        prefs.tone, prefs.reply_length, prefs.positivity, prefs.empathy_level
    )
}

fn preference_override(prefs: &PreferenceState) -> Option<String> {
    if !prefs.has_override() {
        return None;
    }
    Some(format!(
        "[User Preference Override]
The user prefers the following adjustments:
- Tone → {}
- Reply length → {}
- Positivity → {}
Please adapt your language style accordingly, while keeping consistency with your current role and goal.",
        prefs.tone, prefs.reply_length, prefs.positivity
    ))
}

fn guardrails(persona: &str) -> String {
    let mut text = BASE_GUARDRAILS.to_string();
    let extra = match persona {
        COUNSELOR => Some(COUNSELOR_GUARDRAILS),
        FUNNY => Some(FUNNY_GUARDRAILS),
        _ => None,
    };
    if let Some(extra) = extra {
        text.push('\n');
        text.push_str(extra);
    }
    text
}

fn reflection(persona: &str, feedback: &FeedbackMemory) -> Option<String> {
    let recent = feedback.recent(persona, PROMPT_FEEDBACK_COUNT);
    if recent.is_empty() {
        return None;
    }
    let bullets: Vec<String> = recent.iter().map(|r| format!("- {}", r)).collect();
    Some(format!(
        "Recent feedback about your replies:\n{}",
        bullets.join("\n")
    ))
}

/// 人格提示词构建器
pub struct PromptBuilder<'a> {
    registry: &'a PersonaRegistry,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(registry: &'a PersonaRegistry) -> Self {
        Self { registry }
    }

    /// 组装人格提示词；人格不存在时返回 UnknownPersona。不做截断
    pub fn build(
        &self,
        persona_name: &str,
        retrieved_context: &str,
        prefs: &PreferenceState,
        global_tone_hint: &str,
        feedback: &FeedbackMemory,
    ) -> Result<String, AgentError> {
        let persona = self.registry.get(persona_name)?;

        let identity = format!(
            "You are a {}.\nYour goal is to {}.\nMaintain a {} tone (global tone hint: {}).\nAvoid {}.",
            persona.role, persona.objective, persona.tone, global_tone_hint, persona.avoid
        );

        let mut blocks = vec![identity];
        blocks.extend(reflection(persona_name, feedback));
        blocks.extend(preference_override(prefs));
        blocks.push(guardrails(persona_name));
        blocks.push(format!("[Retrieved Context]\n{}", retrieved_context.trim()));
        blocks.push(CLOSING.to_string());

        Ok(blocks.join("\n\n"))
    }
}
