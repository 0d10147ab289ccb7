use super::plan::GenerateMode;

pub const NOTEBOOK_PLAN_PROMPT: &str = r#"You are an experienced lab instructor preparing a practical notebook plan that a student can copy by hand.
Use short, plain sentences. Avoid jargon; if a term is needed, explain it in one line.

Respond with a single JSON object and nothing else. No prose before or after it, no markdown code fences.

SCHEMA:
{
  "title": string,
  "objectives": string[],
  "materials": string[],
  "theory": string,
  "procedure": string[],
  "observations": string[],
  "results": string[],
  "safetyNotes": string[],
  "presentationTips": string[],
  "vivaQuestions": string[],
  "vivaAnswers": string[],
  "diagramImageUrls": string[],
  "suggestedImageSearchQueries": string[],
  "notebookLayout": {
    "leftPane": "diagram" | "blank",
    "rightPane": [{"heading": string, "content": string}]
  },
  "leftPaneImages": [{"title": string, "caption": string, "suggestedSearchQuery": string, "referenceDiagramDescription": string}],
  "writingStyleNotes": string[],
  "tables": [{"title": string, "headers": string[], "rows": string[][]}]
}

RULES:
- Follow the usual two-page notebook convention: the left page holds a diagram (or stays blank), the right page holds the write-up.
- Order rightPane sections the way they are written on the page: Aim, Materials, Theory, Procedure, Observations, Result, Viva and presentation tips.
- "materials" and "procedure" must never be empty. One procedure step per entry, in the imperative.
- Keep theory brief.
- Give 2-3 leftPaneImages, each with a caption to write under the drawing and a precise image search query. Describe what to draw in referenceDiagramDescription.
- Put 3-5 specific queries in suggestedImageSearchQueries. Only list diagramImageUrls you are confident are stable public links.
- Never use markdown tables or the '|' character. Any tabular data (truth tables, readings) goes in "tables" with headers and rows.
- Give 3-5 vivaQuestions and answer each one in vivaAnswers at the same position.

Mode: {mode}
Question: {question}"#;

pub const EXPERIMENT_IDEAS_PROMPT: &str = r#"You are a teacher helping a student plan, write up and present an experiment.
Experiment: "{question}"

Respond with a single JSON object and nothing else:
{
  "title": string,
  "writingInstructions": string,
  "contentGuidelines": string[],
  "implementationIdeas": string[],
  "presentationIdeas": string[],
  "showcaseIdeas": string[],
  "diagramIdeas": string[],
  "improvementSuggestions": string[],
  "materials": string[],
  "procedure": string[],
  "presentationTips": string[],
  "vivaQuestions": string[],
  "vivaAnswers": string[],
  "diagramImageUrls": string[],
  "suggestedImageSearchQueries": string[],
  "leftPaneImages": [{"title": string, "caption": string, "suggestedSearchQuery": string, "referenceDiagramDescription": string}]
}

GUIDANCE:
- writingInstructions explains how to structure the written report.
- contentGuidelines: 5-6 things the report must cover.
- implementationIdeas: 5 creative ways to carry out the experiment.
- presentationIdeas and showcaseIdeas: 4 each.
- diagramIdeas: 5 diagrams worth drawing.
- improvementSuggestions: 3 ways to extend the experiment.
- vivaQuestions: 15-20 questions, each answered in vivaAnswers at the same position.
- suggestedImageSearchQueries: 3 queries.

Keep the content detailed but student friendly."#;

/// Render the instruction text for one generation request.
pub fn build_prompt(mode: GenerateMode, question: &str) -> String {
    if mode.is_idea_generation() {
        EXPERIMENT_IDEAS_PROMPT.replace("{question}", question)
    } else {
        NOTEBOOK_PLAN_PROMPT
            .replace("{mode}", mode.as_str())
            .replace("{question}", question)
    }
}
