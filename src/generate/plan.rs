use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What kind of notebook content is being generated.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum GenerateMode {
    #[default]
    Practical,
    Experiment,
    ExperimentIdeas,
}

impl GenerateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerateMode::Practical => "practical",
            GenerateMode::Experiment => "experiment",
            GenerateMode::ExperimentIdeas => "experiment-ideas",
        }
    }

    /// The idea-generation variant with its own prompt and extra fields.
    pub fn is_idea_generation(&self) -> bool {
        matches!(self, GenerateMode::ExperimentIdeas)
    }

    /// Strict modes require materials and a procedure.
    pub fn requires_full_plan(&self) -> bool {
        !self.is_idea_generation()
    }
}

impl std::fmt::Display for GenerateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LeftPane {
    #[default]
    Diagram,
    Blank,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RightPaneSection {
    pub heading: String,
    pub content: String,
}

/// Two-page notebook arrangement: a drawing page and a write-up page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookLayout {
    pub left_pane: LeftPane,
    /// Sections in the order they should be written.
    pub right_pane: Vec<RightPaneSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeftPaneImage {
    pub title: String,
    pub caption: String,
    pub suggested_search_query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_diagram_description: Option<String>,
}

/// Tabular data the model was told to return as JSON instead of markdown.
/// Row length is expected to match `headers` but isn't enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanTable {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Structured notebook content for one generation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub objectives: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub materials: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theory: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub procedure: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub observations: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub safety_notes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub presentation_tips: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub viva_questions: Vec<String>,
    /// Index-aligned with `viva_questions`; gaps are empty strings.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub viva_answers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagram_image_urls: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggested_image_search_queries: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notebook_layout: Option<NotebookLayout>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub left_pane_images: Vec<LeftPaneImage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub writing_style_notes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<PlanTable>,

    // experiment-ideas only
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub implementation_ideas: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub presentation_ideas: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub showcase_ideas: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagram_ideas: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub improvement_suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writing_instructions: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub content_guidelines: Vec<String>,
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn item_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
        scalar => scalar_text(scalar),
    }
}

/// List of non-empty lines. A bare scalar becomes a one-element list.
fn text_lines(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(item_text)
            .filter(|s| !s.is_empty())
            .collect(),
        Some(other) => scalar_text(other)
            .filter(|s| !s.is_empty())
            .into_iter()
            .collect(),
        None => Vec::new(),
    }
}

/// List that keeps positions: nulls and empties stay as empty strings.
fn aligned_lines(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item_text(item).unwrap_or_default())
            .collect(),
        other => text_lines(other),
    }
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::Array(items) => items
            .iter()
            .filter_map(item_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        other => scalar_text(other)?,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn required_text(value: Option<&Value>) -> String {
    optional_text(value).unwrap_or_default()
}

fn objects(value: Option<&Value>) -> impl Iterator<Item = &Map<String, Value>> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn notebook_layout(value: Option<&Value>) -> Option<NotebookLayout> {
    let layout = value?.as_object()?;
    let left_pane = match layout.get("leftPane").and_then(Value::as_str) {
        Some(pane) if pane.trim().eq_ignore_ascii_case("blank") => LeftPane::Blank,
        _ => LeftPane::Diagram,
    };
    let right_pane = objects(layout.get("rightPane"))
        .map(|section| RightPaneSection {
            heading: required_text(section.get("heading")),
            content: required_text(section.get("content")),
        })
        .filter(|s| !s.heading.is_empty() || !s.content.is_empty())
        .collect();
    Some(NotebookLayout {
        left_pane,
        right_pane,
    })
}

fn left_pane_images(value: Option<&Value>) -> Vec<LeftPaneImage> {
    objects(value)
        .map(|image| LeftPaneImage {
            title: required_text(image.get("title")),
            caption: required_text(image.get("caption")),
            suggested_search_query: required_text(image.get("suggestedSearchQuery")),
            reference_diagram_description: optional_text(
                image.get("referenceDiagramDescription"),
            ),
        })
        .filter(|i| {
            !(i.title.is_empty()
                && i.caption.is_empty()
                && i.suggested_search_query.is_empty()
                && i.reference_diagram_description.is_none())
        })
        .collect()
}

fn tables(value: Option<&Value>) -> Vec<PlanTable> {
    objects(value)
        .map(|table| PlanTable {
            title: required_text(table.get("title")),
            headers: aligned_lines(table.get("headers")),
            rows: table
                .get("rows")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter(|row| row.is_array())
                .map(|row| aligned_lines(Some(row)))
                .collect(),
        })
        .filter(|t| !t.headers.is_empty() || !t.rows.is_empty())
        .collect()
}

impl Plan {
    /// Build a plan from a recovered JSON object.
    ///
    /// Never fails: missing or malformed fields decode as empty. Use
    /// [`Plan::missing_required_fields`] to decide whether the result is usable.
    pub fn from_object(object: Map<String, Value>) -> Self {
        let get = |key: &str| object.get(key);
        Self {
            title: required_text(get("title")),
            objectives: text_lines(get("objectives")),
            materials: text_lines(get("materials")),
            theory: optional_text(get("theory")),
            procedure: text_lines(get("procedure")),
            observations: text_lines(get("observations")),
            results: text_lines(get("results")),
            safety_notes: text_lines(get("safetyNotes")),
            presentation_tips: text_lines(get("presentationTips")),
            viva_questions: text_lines(get("vivaQuestions")),
            viva_answers: aligned_lines(get("vivaAnswers")),
            diagram_image_urls: text_lines(get("diagramImageUrls")),
            suggested_image_search_queries: text_lines(get("suggestedImageSearchQueries")),
            notebook_layout: notebook_layout(get("notebookLayout")),
            left_pane_images: left_pane_images(get("leftPaneImages")),
            writing_style_notes: text_lines(get("writingStyleNotes")),
            tables: tables(get("tables")),
            implementation_ideas: text_lines(get("implementationIdeas")),
            presentation_ideas: text_lines(get("presentationIdeas")),
            showcase_ideas: text_lines(get("showcaseIdeas")),
            diagram_ideas: text_lines(get("diagramIdeas")),
            improvement_suggestions: text_lines(get("improvementSuggestions")),
            writing_instructions: optional_text(get("writingInstructions")),
            content_guidelines: text_lines(get("contentGuidelines")),
        }
    }

    /// Wire names of required fields that are empty for `mode`.
    pub fn missing_required_fields(&self, mode: GenerateMode) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title.is_empty() {
            missing.push("title");
        }
        if mode.requires_full_plan() {
            if self.materials.is_empty() {
                missing.push("materials");
            }
            if self.procedure.is_empty() {
                missing.push("procedure");
            }
        }
        missing
    }

    /// Clear the idea-generation fields unless `mode` is the idea variant.
    pub fn retain_mode_fields(&mut self, mode: GenerateMode) {
        if mode.is_idea_generation() {
            return;
        }
        self.implementation_ideas.clear();
        self.presentation_ideas.clear();
        self.showcase_ideas.clear();
        self.diagram_ideas.clear();
        self.improvement_suggestions.clear();
        self.writing_instructions = None;
        self.content_guidelines.clear();
    }
}
