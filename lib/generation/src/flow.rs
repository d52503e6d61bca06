//! Generation flows.
//!
//! A flow knows how to check a request, phrase it as one model call with a
//! target schema, and check what comes back. Flows hold no connections; the
//! [`Invoker`](crate::Invoker) supplies the backend.

use crate::error::PipelineError;
use kelasi_ai::{LlmCall, MediaPart, PromptTemplate, VariableDefinition};
use kelasi_content::{
    GenerationRequest, LessonContent, LessonRequest, QuizLimits, QuizResult, TRUE_FALSE_OPTIONS,
    VideoScript, VideoScriptRequest,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;

/// Language used when none is configured.
pub const DEFAULT_LANGUAGE: &str = "fr";

/// A kind of content the platform generates.
pub trait GenerationFlow: Send + Sync {
    /// What the teacher asked for.
    type Input: Send + Sync;
    /// What the model must produce.
    type Output: DeserializeOwned + Serialize + Send;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Checks the request before anything is charged.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` describing the first violation.
    fn validate(&self, input: &Self::Input) -> Result<(), PipelineError>;

    /// Builds the single model call for a request.
    ///
    /// # Errors
    ///
    /// Returns `MissingInput` if the request has nothing to generate from, or
    /// `GenerationFailed` if the prompt cannot be rendered.
    fn build_call(&self, input: &Self::Input) -> Result<LlmCall, PipelineError>;

    /// Checks a parsed model answer against the request.
    ///
    /// # Errors
    ///
    /// Returns `MalformedOutput` if the answer violates its contract.
    fn check_output(&self, input: &Self::Input, output: &Self::Output)
    -> Result<(), PipelineError>;
}

/// Human name of a language code, as the model should read it.
fn language_name(code: &str) -> &str {
    match code.to_ascii_lowercase().as_str() {
        "fr" => "French",
        "en" => "English",
        "sw" => "Swahili",
        "ln" => "Lingala",
        _ => code,
    }
}

/// System instruction shared by every flow.
const LANGUAGE_INSTRUCTION: &str = "Write every piece of generated text in {{language}}, \
whatever the language of the source material.";

/// Renders a template and its system prompt into a call.
fn prepare(
    template: &PromptTemplate,
    variables: &HashMap<String, JsonValue>,
) -> Result<LlmCall, PipelineError> {
    let prompt_failed = |e: kelasi_ai::PromptError| PipelineError::GenerationFailed {
        reason: e.to_string(),
    };

    let mut call = LlmCall::new(template.render(variables).map_err(prompt_failed)?);
    if let Some(system) = template
        .render_system_prompt(variables)
        .map_err(prompt_failed)?
    {
        call = call.with_system_prompt(system);
    }
    Ok(call)
}

fn malformed(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::MalformedOutput {
        reason: e.to_string(),
    }
}

const QUIZ_PROMPT: &str = "You are an expert quiz generator for teachers.

You will generate a quiz in {{language}} from the given lesson content.
The content can be provided as raw text or as a document. Use the content provided to create the quiz.

The questions should be of the specified type. For multiple choice questions, provide 4 options. For true/false questions, provide \"{{true_label}}\" and \"{{false_label}}\" as options. For short answer, the options array can be empty, but the answer field should contain the expected answer.
{{#if lesson_text}}
Lesson Text: {{lesson_text}}
{{/if}}{{#if document}}
Lesson Document: see the attached document.
{{/if}}
Question Type: {{question_type}}
Number of Questions: {{count}}

The output must be a valid JSON object matching the requested schema.";

/// Quiz generation from lesson text or a document.
#[derive(Debug, Clone)]
pub struct QuizFlow {
    limits: QuizLimits,
    language: String,
    template: PromptTemplate,
}

impl QuizFlow {
    /// Creates the flow with the given limits and output language code.
    #[must_use]
    pub fn new(limits: QuizLimits, language: impl Into<String>) -> Self {
        let template = PromptTemplate::new("generate_quiz", QUIZ_PROMPT)
            .with_system_prompt(LANGUAGE_INSTRUCTION)
            .with_variable("language", VariableDefinition::required("Output language"))
            .with_variable("question_type", VariableDefinition::required("Question type"))
            .with_variable("count", VariableDefinition::required("Number of questions"))
            .with_variable("lesson_text", VariableDefinition::optional("Lesson text"))
            .with_variable("document", VariableDefinition::optional("Document attached"))
            .with_variable(
                "true_label",
                VariableDefinition::optional("True label")
                    .with_default(json!(TRUE_FALSE_OPTIONS[0])),
            )
            .with_variable(
                "false_label",
                VariableDefinition::optional("False label")
                    .with_default(json!(TRUE_FALSE_OPTIONS[1])),
            );

        Self {
            limits,
            language: language.into(),
            template,
        }
    }

    /// Limits requests are checked against.
    #[must_use]
    pub fn limits(&self) -> &QuizLimits {
        &self.limits
    }
}

impl Default for QuizFlow {
    fn default() -> Self {
        Self::new(QuizLimits::default(), DEFAULT_LANGUAGE)
    }
}

impl GenerationFlow for QuizFlow {
    type Input = GenerationRequest;
    type Output = QuizResult;

    fn name(&self) -> &'static str {
        "quiz"
    }

    fn validate(&self, input: &GenerationRequest) -> Result<(), PipelineError> {
        Ok(input.validate(&self.limits)?)
    }

    fn build_call(&self, input: &GenerationRequest) -> Result<LlmCall, PipelineError> {
        let text = input.text.as_deref().filter(|t| !t.trim().is_empty());
        if text.is_none() && input.document.is_none() {
            return Err(PipelineError::MissingInput);
        }

        let mut variables = HashMap::from([
            ("language".to_string(), json!(language_name(&self.language))),
            ("question_type".to_string(), json!(input.question_type.label())),
            ("count".to_string(), json!(input.count)),
        ]);
        if let Some(text) = text {
            variables.insert("lesson_text".to_string(), json!(text));
        }
        if input.document.is_some() {
            variables.insert("document".to_string(), json!(true));
        }

        let mut call =
            prepare(&self.template, &variables)?.with_output_schema(QuizResult::output_schema());
        if let Some(document) = &input.document {
            call = call.with_media(MediaPart::new(
                document.mime_type.clone(),
                document.bytes.clone(),
            ));
        }
        Ok(call)
    }

    fn check_output(
        &self,
        input: &GenerationRequest,
        output: &QuizResult,
    ) -> Result<(), PipelineError> {
        output.validate_for(input.question_type).map_err(malformed)?;

        let requested = usize::try_from(input.count).unwrap_or(usize::MAX);
        if output.questions.len() != requested {
            tracing::warn!(
                requested,
                returned = output.questions.len(),
                question_type = input.question_type.as_str(),
                "quiz question count differs from request"
            );
        }
        Ok(())
    }
}

const LESSON_PROMPT: &str = "You are an experienced teacher who writes lesson plans.

Write a lesson plan in {{language}} for the topic below.

Topic: {{topic}}
Grade Level: {{grade_level}}
{{#if subject}}Subject: {{subject}}
{{/if}}{{#if duration_minutes}}Duration: {{duration_minutes}} minutes
{{/if}}
Give the lesson a title, list its learning objectives, and split it into sections in teaching order, each with a heading and a body.

The output must be a valid JSON object matching the requested schema.";

/// Lesson plan generation.
#[derive(Debug, Clone)]
pub struct LessonFlow {
    language: String,
    template: PromptTemplate,
}

impl LessonFlow {
    /// Creates the flow with the given output language code.
    #[must_use]
    pub fn new(language: impl Into<String>) -> Self {
        let template = PromptTemplate::new("generate_lesson", LESSON_PROMPT)
            .with_system_prompt(LANGUAGE_INSTRUCTION)
            .with_variable("language", VariableDefinition::required("Output language"))
            .with_variable("topic", VariableDefinition::required("Lesson topic"))
            .with_variable("grade_level", VariableDefinition::required("Grade level"))
            .with_variable("subject", VariableDefinition::optional("School subject"))
            .with_variable("duration_minutes", VariableDefinition::optional("Duration"));

        Self {
            language: language.into(),
            template,
        }
    }
}

impl Default for LessonFlow {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE)
    }
}

impl GenerationFlow for LessonFlow {
    type Input = LessonRequest;
    type Output = LessonContent;

    fn name(&self) -> &'static str {
        "lesson"
    }

    fn validate(&self, input: &LessonRequest) -> Result<(), PipelineError> {
        Ok(input.validate()?)
    }

    fn build_call(&self, input: &LessonRequest) -> Result<LlmCall, PipelineError> {
        if input.topic.trim().is_empty() {
            return Err(PipelineError::MissingInput);
        }

        let mut variables = HashMap::from([
            ("language".to_string(), json!(language_name(&self.language))),
            ("topic".to_string(), json!(input.topic.trim())),
            ("grade_level".to_string(), json!(input.grade_level.trim())),
        ]);
        if let Some(subject) = &input.subject {
            variables.insert("subject".to_string(), json!(subject.trim()));
        }
        if let Some(minutes) = input.duration_minutes {
            variables.insert("duration_minutes".to_string(), json!(minutes));
        }

        Ok(prepare(&self.template, &variables)?.with_output_schema(LessonContent::output_schema()))
    }

    fn check_output(
        &self,
        _input: &LessonRequest,
        output: &LessonContent,
    ) -> Result<(), PipelineError> {
        output.validate().map_err(malformed)
    }
}

const VIDEO_PROMPT: &str = "You are a scriptwriter for short educational videos.

Write a video script in {{language}} about the topic below.

Topic: {{topic}}
{{#if audience}}Audience: {{audience}}
{{/if}}{{#if duration_minutes}}Target Length: {{duration_minutes}} minutes
{{/if}}
Give the video a title and split it into scenes in running order. Each scene has the narrator's words and a description of what is shown on screen.

The output must be a valid JSON object matching the requested schema.";

/// Educational video script generation.
#[derive(Debug, Clone)]
pub struct VideoScriptFlow {
    language: String,
    template: PromptTemplate,
}

impl VideoScriptFlow {
    /// Creates the flow with the given output language code.
    #[must_use]
    pub fn new(language: impl Into<String>) -> Self {
        let template = PromptTemplate::new("generate_video_script", VIDEO_PROMPT)
            .with_system_prompt(LANGUAGE_INSTRUCTION)
            .with_variable("language", VariableDefinition::required("Output language"))
            .with_variable("topic", VariableDefinition::required("Video topic"))
            .with_variable("audience", VariableDefinition::optional("Audience"))
            .with_variable("duration_minutes", VariableDefinition::optional("Length"));

        Self {
            language: language.into(),
            template,
        }
    }
}

impl Default for VideoScriptFlow {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE)
    }
}

impl GenerationFlow for VideoScriptFlow {
    type Input = VideoScriptRequest;
    type Output = VideoScript;

    fn name(&self) -> &'static str {
        "video_script"
    }

    fn validate(&self, input: &VideoScriptRequest) -> Result<(), PipelineError> {
        Ok(input.validate()?)
    }

    fn build_call(&self, input: &VideoScriptRequest) -> Result<LlmCall, PipelineError> {
        if input.topic.trim().is_empty() {
            return Err(PipelineError::MissingInput);
        }

        let mut variables = HashMap::from([
            ("language".to_string(), json!(language_name(&self.language))),
            ("topic".to_string(), json!(input.topic.trim())),
        ]);
        if let Some(audience) = &input.audience {
            variables.insert("audience".to_string(), json!(audience.trim()));
        }
        if let Some(minutes) = input.duration_minutes {
            variables.insert("duration_minutes".to_string(), json!(minutes));
        }

        Ok(prepare(&self.template, &variables)?.with_output_schema(VideoScript::output_schema()))
    }

    fn check_output(
        &self,
        _input: &VideoScriptRequest,
        output: &VideoScript,
    ) -> Result<(), PipelineError> {
        output.validate().map_err(malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kelasi_content::{DocumentInput, Question, QuestionType};

    const LESSON: &str = "La photosynthèse est le processus par lequel les plantes vertes produisent leur nourriture.";

    #[test]
    fn quiz_prompt_carries_text_and_settings() {
        let flow = QuizFlow::default();
        let request = GenerationRequest::from_text(LESSON, QuestionType::TrueFalse, 3);

        let call = flow.build_call(&request).expect("builds");
        let prompt = &call.request().prompt;

        assert!(prompt.contains(LESSON));
        assert!(prompt.contains("in French"));
        assert!(prompt.contains("Question Type: true/false"));
        assert!(prompt.contains("Number of Questions: 3"));
        assert!(prompt.contains("\"Vrai\" and \"Faux\""));
        assert!(!prompt.contains("Lesson Document"));
        assert!(!prompt.contains("attached document"));
        assert!(call.request().media.is_empty());
        assert_eq!(call.request().output_schema, Some(QuizResult::output_schema()));
    }

    #[test]
    fn short_text_only_prompt_mentions_no_document() {
        let flow = QuizFlow::default();
        let text = "Les volcans rejettent de la lave, des cendres et des gaz.";
        let request = GenerationRequest::from_text(text, QuestionType::ShortAnswer, 2);

        let call = flow.build_call(&request).expect("builds");
        let prompt = &call.request().prompt;

        assert!(prompt.contains(&format!("Lesson Text: {text}")));
        assert!(!prompt.contains("see the attached document"));
    }

    #[test]
    fn every_flow_sends_the_language_instruction() {
        let quiz = QuizFlow::new(QuizLimits::default(), "sw")
            .build_call(&GenerationRequest::from_text(LESSON, QuestionType::ShortAnswer, 1))
            .expect("builds");
        assert_eq!(
            quiz.request().system.as_deref(),
            Some("Write every piece of generated text in Swahili, whatever the language of the source material.")
        );

        let lesson = LessonFlow::default()
            .build_call(&LessonRequest {
                topic: "Les fractions".to_string(),
                grade_level: "CM1".to_string(),
                subject: None,
                duration_minutes: None,
            })
            .expect("builds");
        assert!(
            lesson
                .request()
                .system
                .as_deref()
                .is_some_and(|s| s.contains("in French"))
        );

        let video = VideoScriptFlow::new("en")
            .build_call(&VideoScriptRequest {
                topic: "Le cycle de l'eau".to_string(),
                audience: None,
                duration_minutes: None,
            })
            .expect("builds");
        assert!(
            video
                .request()
                .system
                .as_deref()
                .is_some_and(|s| s.contains("in English"))
        );
    }

    #[test]
    fn quiz_document_goes_as_media() {
        let flow = QuizFlow::new(QuizLimits::default(), "en");
        let document = DocumentInput::new(b"%PDF-1.4".to_vec(), "application/pdf");
        let request = GenerationRequest::from_document(document, QuestionType::ShortAnswer, 5);

        let call = flow.build_call(&request).expect("builds");
        let prompt = &call.request().prompt;

        assert!(prompt.contains("in English"));
        assert!(prompt.contains("Lesson Document"));
        assert!(!prompt.contains("Lesson Text"));
        assert_eq!(call.request().media.len(), 1);
        assert_eq!(call.request().media[0].mime_type, "application/pdf");
        assert_eq!(call.request().media[0].data, b"%PDF-1.4".to_vec());
    }

    #[test]
    fn quiz_without_source_is_missing_input() {
        let flow = QuizFlow::default();
        let request = GenerationRequest {
            text: Some("   ".to_string()),
            document: None,
            question_type: QuestionType::MultipleChoice,
            count: 5,
        };
        assert_eq!(flow.build_call(&request).err(), Some(PipelineError::MissingInput));
    }

    #[test]
    fn quiz_output_checks_option_count() {
        let flow = QuizFlow::default();
        let request = GenerationRequest::from_text(LESSON, QuestionType::MultipleChoice, 1);
        let three_options = QuizResult::new(vec![Question::new(
            "Que produit la photosynthèse ?",
            vec!["Du glucose".into(), "Du sel".into(), "Du fer".into()],
            "Du glucose",
        )]);

        assert!(matches!(
            flow.check_output(&request, &three_options),
            Err(PipelineError::MalformedOutput { .. })
        ));
    }

    #[test]
    fn quiz_count_mismatch_is_accepted() {
        let flow = QuizFlow::default();
        let request = GenerationRequest::from_text(LESSON, QuestionType::ShortAnswer, 5);
        let one = QuizResult::new(vec![Question::new("Qui fait la photosynthèse ?", vec![], "Les plantes")]);
        assert_eq!(flow.check_output(&request, &one), Ok(()));

        let none = QuizResult::new(vec![]);
        assert!(matches!(
            flow.check_output(&request, &none),
            Err(PipelineError::MalformedOutput { .. })
        ));
    }

    #[test]
    fn lesson_prompt_includes_optional_fields_when_given() {
        let flow = LessonFlow::default();
        let request = LessonRequest {
            topic: "Les fractions".to_string(),
            grade_level: "CM1".to_string(),
            subject: Some("Mathématiques".to_string()),
            duration_minutes: None,
        };

        let call = flow.build_call(&request).expect("builds");
        let prompt = &call.request().prompt;
        assert!(prompt.contains("Topic: Les fractions"));
        assert!(prompt.contains("Grade Level: CM1"));
        assert!(prompt.contains("Subject: Mathématiques"));
        assert!(!prompt.contains("Duration"));
        assert_eq!(call.request().output_schema, Some(LessonContent::output_schema()));
    }

    #[test]
    fn video_prompt_and_validation() {
        let flow = VideoScriptFlow::default();
        let request = VideoScriptRequest {
            topic: "Le cycle de l'eau".to_string(),
            audience: None,
            duration_minutes: Some(3),
        };

        let call = flow.build_call(&request).expect("builds");
        assert!(call.request().prompt.contains("Target Length: 3 minutes"));
        assert!(!call.request().prompt.contains("Audience"));

        let too_long = VideoScriptRequest {
            duration_minutes: Some(90),
            ..request
        };
        assert!(matches!(
            flow.validate(&too_long),
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[test]
    fn unknown_language_code_is_passed_through() {
        assert_eq!(language_name("FR"), "French");
        assert_eq!(language_name("pt"), "pt");
    }
}
