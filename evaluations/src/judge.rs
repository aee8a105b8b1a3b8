use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use common::{error::AppError, models::PredictionRecord};
use tracing::debug;

use crate::{args::JudgeSetting, openai};

const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TEMPERATURE: f32 = 0.0;
const DEFAULT_SEED: i64 = 42;

const SYSTEM_MESSAGE: &str = "You are a fair judge assistant tasked with providing clear, \
    objective feedback based on specific criteria, ensuring each assessment reflects the \
    absolute standards set for performance.";

const GRADING_PREAMBLE: &str = "###Task Description:\n\
    An instruction (might include an Input inside it), a response to evaluate, reference \
    answers that get a score of 5, and a score rubric representing evaluation criteria are given.\n\
    1. Write a detailed feedback that assesses the quality of the response strictly based on \
    the given score rubric, not evaluating in general.\n\
    2. After writing the feedback, write a score that is an integer between 1 and 5. You \
    should refer to the score rubric.\n\
    3. The output format should look as follows: \"Feedback: (write a feedback for criteria) \
    [RESULT] (an integer number between 1 and 5)\"\n\
    4. Please do not generate any other opening, closing, and explanations.";

const REFERENCES_INSTRUCTION: &str = "You are an expert narrative analyst tasked with \
    evaluating candidate answers to questions about books. Here is the question of the story \
    {title}:\nQuestion:\n{question}";

const SUMMARY_INSTRUCTION: &str = "You are an expert narrative analyst tasked with evaluating \
    candidate answers to questions about books. You are provided with the summary of the book \
    to refer to as added context. Here is the summary of {title}:\n{summary}\n\nQuestion:\n{question}";

const REFERENCES_CRITERIA: &str =
    "How acceptable is the candidate answer compared to the reference answer?";
const SUMMARY_CRITERIA: &str = "How acceptable is the candidate answer EITHER compared to the \
    reference answer OR validated against the summary?";

const SCORE_DESCRIPTIONS: [&str; 5] = [
    "The candidate answer is completely wrong.",
    "The answer does not answer the original question, but there is some information related \
     to the reference answer or summary.",
    "The candidate answer is partially correct, but it contains some errors, omits key \
     information or adds major extra information.",
    "The candidate answer is correct but it includes minor details that cannot be verified \
     against the reference.",
    "The candidate answer is either exactly identical to one of the reference answers or it \
     is a paraphrase of a reference answer that does not alter its meaning.",
];

// The summary setting lets the judge check extra details against the summary.
const SUMMARY_SCORE_4_DESCRIPTION: &str = "The candidate answer is correct but it includes \
     minor details that cannot be verified against the reference or the summary.";

/// Absolute-grading judge backed by a chat-completion endpoint.
pub struct Judge {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    setting: JudgeSetting,
}

impl Judge {
    pub fn from_env(model: &str, setting: JudgeSetting) -> anyhow::Result<Self> {
        let (client, base_url) = openai::build_client_from_env()?;
        tracing::info!(model, %base_url, "Initialized judge client");
        Ok(Self {
            client,
            model: model.to_string(),
            setting,
        })
    }

    /// Grade one prediction; returns the rubric score in 1..=5.
    pub async fn grade(&self, entry: &PredictionRecord) -> Result<u8, AppError> {
        let request = self.build_request(entry)?;
        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or(AppError::LLMParsing(
                "No content found in judge response".into(),
            ))?;

        parse_verdict(content).ok_or_else(|| {
            AppError::LLMParsing(format!("Could not parse judge verdict from: {content}"))
        })
    }

    fn build_request(&self, entry: &PredictionRecord) -> Result<CreateChatCompletionRequest, AppError> {
        let instruction = build_instruction(self.setting, entry)?;
        let reference_answers = entry.answers.join("\n");
        let rubric = build_rubric(self.setting);

        let user_message = format!(
            "{GRADING_PREAMBLE}\n\n\
             ###The instruction to evaluate:\n{instruction}\n\n\
             ###Response to evaluate:\n{prediction}\n\n\
             ###Reference Answer (Score 5):\n{reference_answers}\n\n\
             ###Score Rubrics:\n{rubric}\n\n\
             ###Feedback: ",
            prediction = entry.prediction,
        );
        debug!(model = %self.model, "Prepared judge request");

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessage::from(SYSTEM_MESSAGE).into(),
                ChatCompletionRequestUserMessage::from(user_message).into(),
            ])
            .max_tokens(DEFAULT_MAX_TOKENS)
            .temperature(DEFAULT_TEMPERATURE)
            .seed(DEFAULT_SEED)
            .build()?;

        Ok(request)
    }
}

fn build_instruction(setting: JudgeSetting, entry: &PredictionRecord) -> Result<String, AppError> {
    let question = entry
        .question
        .as_deref()
        .ok_or_else(|| AppError::Validation("prediction entry is missing 'question'".into()))?;
    let title = entry
        .title
        .as_deref()
        .ok_or_else(|| AppError::Validation("prediction entry is missing 'title'".into()))?;

    match setting {
        JudgeSetting::References => Ok(REFERENCES_INSTRUCTION
            .replace("{title}", title)
            .replace("{question}", question)),
        JudgeSetting::Summary => {
            let summary = entry.summary.as_deref().ok_or_else(|| {
                AppError::Validation("prediction entry is missing 'summary'".into())
            })?;
            Ok(SUMMARY_INSTRUCTION
                .replace("{title}", title)
                .replace("{summary}", summary)
                .replace("{question}", question))
        }
    }
}

fn build_rubric(setting: JudgeSetting) -> String {
    let criteria = match setting {
        JudgeSetting::References => REFERENCES_CRITERIA,
        JudgeSetting::Summary => SUMMARY_CRITERIA,
    };
    let mut rubric = format!("[{criteria}]");
    for (idx, description) in SCORE_DESCRIPTIONS.iter().enumerate() {
        let description = match (setting, idx) {
            (JudgeSetting::Summary, 3) => SUMMARY_SCORE_4_DESCRIPTION,
            _ => *description,
        };
        rubric.push_str(&format!("\nScore {}: {description}", idx + 1));
    }
    rubric
}

/// Parse the judge verdict: the Prometheus `[RESULT] n` tail, or a bare
/// trailing integer. Only 1..=5 is accepted.
pub fn parse_verdict(content: &str) -> Option<u8> {
    let candidate = content
        .rsplit_once("[RESULT]")
        .map_or_else(|| content.trim(), |(_, tail)| tail.trim());

    let digits: String = candidate
        .split_whitespace()
        .last()?
        .chars()
        .filter(char::is_ascii_digit)
        .collect();

    let score = digits.parse::<u8>().ok()?;
    (1..=5).contains(&score).then_some(score)
}
