//! Note styles and the instruction prompts sent with each photographed note.
//!
//! Every style maps to exactly one fixed prompt. Nothing is interpolated: the
//! image carries all the per-request content, so a style is a pure function
//! of the enum and can be inspected in tests without a VLM.
//!
//! The Rewrite and SolveExercises prompts forbid emojis because their output
//! is typeset by a LaTeX engine first, and most emoji code points make
//! `pdflatex` fail outright.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the photographed note should be rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoteStyle {
    /// Clean A-student rewrite with a quiz and a "Remember" section. (default)
    #[default]
    Rewrite,
    /// Two tables: term definitions and simple examples.
    DefineTerms,
    /// Absurdist, emoji-heavy retelling that still covers every point.
    Parody,
    /// Step-by-step solutions for every exercise in the picture.
    SolveExercises,
}

impl NoteStyle {
    pub const ALL: [NoteStyle; 4] = [
        NoteStyle::Rewrite,
        NoteStyle::DefineTerms,
        NoteStyle::Parody,
        NoteStyle::SolveExercises,
    ];

    /// The instruction text for this style.
    pub fn prompt(self) -> &'static str {
        prompt_for(self)
    }

    /// Kebab-case name used on the command line and in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            NoteStyle::Rewrite => "rewrite",
            NoteStyle::DefineTerms => "define-terms",
            NoteStyle::Parody => "parody",
            NoteStyle::SolveExercises => "solve-exercises",
        }
    }

    /// Fixed sampling parameters for this style.
    ///
    /// Parody runs hot on purpose; the two styles whose output must be
    /// factually right (definitions, solutions) run cold.
    pub fn sampling(self) -> Sampling {
        match self {
            NoteStyle::Rewrite => Sampling {
                temperature: 0.4,
                top_p: 1.0,
            },
            NoteStyle::DefineTerms => Sampling {
                temperature: 0.3,
                top_p: 0.95,
            },
            NoteStyle::Parody => Sampling {
                temperature: 1.0,
                top_p: 0.95,
            },
            NoteStyle::SolveExercises => Sampling {
                temperature: 0.3,
                top_p: 1.0,
            },
        }
    }
}

impl fmt::Display for NoteStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "rewrite" => Ok(NoteStyle::Rewrite),
            "define-terms" | "define" | "terms" => Ok(NoteStyle::DefineTerms),
            "parody" => Ok(NoteStyle::Parody),
            "solve-exercises" | "solve" | "exercises" => Ok(NoteStyle::SolveExercises),
            other => Err(format!(
                "unknown note style '{other}' (expected rewrite, define-terms, parody or solve-exercises)"
            )),
        }
    }
}

/// Sampling parameters sent with the completion request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
}

/// Return the instruction prompt for `style`.
pub fn prompt_for(style: NoteStyle) -> &'static str {
    match style {
        NoteStyle::Rewrite => REWRITE_PROMPT,
        NoteStyle::DefineTerms => DEFINE_TERMS_PROMPT,
        NoteStyle::Parody => PARODY_PROMPT,
        NoteStyle::SolveExercises => SOLVE_EXERCISES_PROMPT,
    }
}

pub const REWRITE_PROMPT: &str = r#"Explain the note and write it as a new note the way an A student would take notes.

Requirements:
1. Output in markdown format.
2. Make it enjoyable and add a simple game to learn it better, e.g. a quick quiz, a memory game, a practice problem or a fill-in-the-blanks exercise.
3. Have a separate section explaining it in layman's terms, including any word that may be confusing for a student.
4. Don't say anything additional after you are done with the notes.
5. Keep it clean and simple.
6. Do NOT use emojis anywhere.
7. If you need to output math, use LaTeX in markdown ($inline$ and $$display$$).
8. If you need to output code, use a fenced code block.
9. Use a markdown table whenever it visualises data better.
10. Make sure not to miss anything in the given picture.
11. Decline to output if the picture is not related to studies.
12. Don't output code that is not related to the notes.
13. Finish with a "Remember" section listing the most important points."#;

pub const DEFINE_TERMS_PROMPT: &str = r#"Find every complex or technical term in the note and explain it.

Requirements:
1. Output in markdown format.
2. Output exactly two markdown tables and nothing else.
3. Table 1 has the columns | Term | Definition | and defines each term in one or two plain sentences.
4. Table 2 has the columns | Term | Simple Example | and gives an everyday example for the same terms, in the same order.
5. Do not add headings, introductions or closing remarks outside the tables.
6. If you need to output math, use LaTeX in markdown ($inline$).
7. Decline to output if the picture is not related to studies."#;

pub const PARODY_PROMPT: &str = r#"Rewrite the note as an over-the-top parody.

Requirements:
1. Output in markdown format.
2. Be absurd, dramatic and funny, like a soap opera narrator who is far too invested in the topic.
3. Use LOTS of emojis, in every paragraph and every heading.
4. Every fact in the note must still appear and must still be correct; only the tone is ridiculous.
5. Use headings and bullet points so it is still readable as a study note.
6. End with a section called "The Moral of the Story" that restates the key points.
7. Decline to output if the picture is not related to studies."#;

pub const SOLVE_EXERCISES_PROMPT: &str = r###"Solve every exercise, problem or question shown in the note.

Requirements:
1. Output in markdown format.
2. Use one heading per exercise, numbered as in the picture (e.g. "## Exercise 1" or "## Part A").
3. Restate the exercise, then solve it step by step, explaining each step briefly.
4. Write all math in LaTeX in markdown ($inline$ and $$display$$).
5. Put each final answer in bold on its own line.
6. Do NOT use emojis anywhere.
7. If an exercise is unreadable, say so instead of guessing.
8. Don't say anything additional after the last solution.
9. Decline to output if the picture is not related to studies."###;
