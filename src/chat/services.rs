use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::dto::HealthChatRequest;
use super::repo::{self, ChatMessage, ROLE_ASSISTANT};
use crate::clients::ai::{AiClient, AiError, CompletionRequest, InlineImage, Message};
use crate::error::{AppError, AppResult};
use crate::goals::{self, Goals};
use crate::medical::{self, MedicalReport};
use crate::profiles::{self, Profile};
use crate::scans::{self, ScanRecord};

pub const MAX_MESSAGE_CHARS: usize = 4000;
const RECENT_SCANS: i64 = 10;
const RECENT_REPORTS: i64 = 3;
const HISTORY_TURNS: i64 = 20;

/// Everything the assistant knows about the user for one turn.
#[derive(Debug, Default)]
pub struct ChatContext {
    pub profile: Option<Profile>,
    pub goals: Option<Goals>,
    pub scans: Vec<ScanRecord>,
    pub reports: Vec<MedicalReport>,
    pub history: Vec<ChatMessage>,
}

/// Checks ownership and content; returns the trimmed message, if any.
pub fn validate_request(req: &HealthChatRequest, caller: Uuid) -> AppResult<Option<String>> {
    if let Some(claimed) = req.user_id {
        if claimed != caller {
            return Err(AppError::Forbidden("userId does not match the signed-in user".into()));
        }
    }
    let message = req
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty());
    if let Some(m) = message {
        if m.chars().count() > MAX_MESSAGE_CHARS {
            return Err(AppError::bad_request(format!(
                "Message is too long, maximum is {MAX_MESSAGE_CHARS} characters"
            )));
        }
    }
    let has_image = req.image.as_deref().is_some_and(|i| !i.trim().is_empty());
    if message.is_none() && !has_image {
        return Err(AppError::bad_request("Send a message or an image"));
    }
    Ok(message.map(str::to_string))
}

#[instrument(skip(db))]
pub async fn load_context(db: &PgPool, user_id: Uuid) -> anyhow::Result<ChatContext> {
    let (profile, (goals, _), scans, reports, history) = tokio::try_join!(
        profiles::repo::get(db, user_id),
        goals::services::effective_goals(db, user_id),
        scans::repo::list_by_user(db, user_id, RECENT_SCANS, 0),
        medical::repo::list_by_user(db, user_id, RECENT_REPORTS, 0),
        repo::recent(db, user_id, HISTORY_TURNS),
    )?;
    Ok(ChatContext {
        profile,
        goals: Some(goals),
        scans,
        reports,
        history,
    })
}

pub fn build_system_prompt(ctx: &ChatContext) -> String {
    let mut lines: Vec<String> = vec![
        "You are NutriScan's health assistant. Give practical, friendly nutrition and \
         wellness guidance grounded in the user's data below. Keep answers short. You are \
         not a doctor: for symptoms or abnormal results, recommend seeing one."
            .into(),
    ];

    if let Some(pr) = &ctx.profile {
        lines.push("\nUser profile:".into());
        if let Some(name) = &pr.full_name {
            lines.push(format!("- name: {name}"));
        }
        if let Some(age) = pr.age {
            lines.push(format!("- age: {age}"));
        }
        if let Some(g) = &pr.gender {
            lines.push(format!("- gender: {g}"));
        }
        if let (Some(h), Some(w)) = (pr.height_cm, pr.weight_kg) {
            lines.push(format!("- height {h} cm, weight {w} kg"));
        }
        if let Some(goal) = &pr.weight_goal {
            lines.push(format!("- weight goal: {goal}"));
        }
        if let Some(diet) = &pr.dietary_preference {
            lines.push(format!("- diet: {diet}"));
        }
        if !pr.health_conditions.is_empty() {
            lines.push(format!("- health conditions: {}", pr.health_conditions.join(", ")));
        }
        if let Some(lang) = pr.preferred_language.as_deref().filter(|l| *l != "en") {
            lines.push(format!("- reply in language code: {lang}"));
        }
    }

    if let Some(g) = &ctx.goals {
        lines.push(format!(
            "\nDaily goals: {} kcal, {} g protein, {} g carbs, {} g fat, {} g fiber, {} ml water",
            g.daily_calories, g.protein_g, g.carbs_g, g.fat_g, g.fiber_g, g.water_ml
        ));
    }

    if !ctx.scans.is_empty() {
        lines.push("\nRecent meals (newest first):".into());
        lines.extend(ctx.scans.iter().map(|s| {
            format!(
                "- {} {}: {} kcal, {} g protein, {} g carbs, {} g fat",
                s.created_at.date(),
                s.food_name,
                s.calories,
                s.protein,
                s.carbs,
                s.fat
            )
        }));
    }

    if !ctx.reports.is_empty() {
        lines.push("\nRecent medical reports:".into());
        for r in &ctx.reports {
            lines.push(format!("- {} ({}): {}", r.report_type, r.created_at.date(), r.summary));
            lines.extend(r.findings.0.iter().take(10).map(|f| {
                format!(
                    "  * {}: {} {} [{}]",
                    f.name,
                    f.value,
                    f.unit.as_deref().unwrap_or(""),
                    f.status.as_str()
                )
            }));
        }
    }

    let mut prompt = lines.join("\n");
    prompt.push('\n');
    prompt
}

pub fn build_messages(
    ctx: &ChatContext,
    message: Option<&str>,
    image: Option<InlineImage>,
) -> Vec<Message> {
    let mut out = Vec::with_capacity(ctx.history.len() + 2);
    out.push(Message::system(build_system_prompt(ctx)));
    for m in &ctx.history {
        out.push(if m.role == ROLE_ASSISTANT {
            Message::assistant(&m.content)
        } else {
            Message::user(&m.content)
        });
    }
    let text = message.unwrap_or("What can you tell me about this image?");
    let mut user = Message::user(text);
    if let Some(img) = image {
        user = user.with_image(img);
    }
    out.push(user);
    out
}

pub async fn reply(ai: &dyn AiClient, messages: Vec<Message>) -> AppResult<String> {
    let req = CompletionRequest {
        temperature: Some(0.7),
        ..CompletionRequest::new(messages)
    };
    let text = ai.complete(req).await?;
    let text = text.trim();
    if text.is_empty() {
        return Err(AiError::EmptyResponse.into());
    }
    Ok(text.to_string())
}
