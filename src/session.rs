//! Per-session resubmission cache.
//!
//! A [`Session`] remembers the photo the user picked, whether it has been
//! armed for submission, and the last note and PDF produced from it. The
//! pipeline handlers in [`crate::notes`] take a session by value and hand it
//! back, so there is no shared mutable state between users.
//!
//! ## State rules
//!
//! | Event                          | photo      | pending image | note / PDF |
//! |--------------------------------|------------|---------------|------------|
//! | image selected                 | submitted  | replaced      | cleared    |
//! | style changed, image pending   | submitted  | restyled      | cleared    |
//! | image cleared                  | not done   | none          | cleared    |
//! | successful submit              | not done   | kept          | replaced   |
//!
//! "Submitted" means the photo may be sent to the model once. Submitting
//! again without a new image or style is refused with
//! [`NotesError::MissingImage`], which keeps a double click from paying for
//! two model calls.

use crate::error::NotesError;
use crate::output::{GeneratedNote, NoteRequest, RenderedArtifact};
use crate::prompts::NoteStyle;
use serde::{Deserialize, Serialize};

/// Whether the current photo is armed for submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PhotoState {
    #[default]
    NotDone,
    Done,
}

/// Where a session stands, derived from its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    NotSubmitted,
    Submitted,
    Generated,
    Rendered,
    RenderFailed,
}

/// State carried between user interactions.
#[derive(Debug, Clone, Default)]
pub struct Session {
    photo: PhotoState,
    style: NoteStyle,
    pending: Option<NoteRequest>,
    note: Option<GeneratedNote>,
    artifact: Option<RenderedArtifact>,
    last_render_error: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh session using `style` for the next submission.
    pub fn with_style(style: NoteStyle) -> Self {
        Self {
            style,
            ..Self::default()
        }
    }

    /// Set or clear the photo.
    ///
    /// The request is restyled to the session's current style. `None`
    /// behaves like [`Session::clear`].
    pub fn select_image(&mut self, request: Option<NoteRequest>) {
        match request {
            Some(mut request) => {
                request.style = self.style;
                self.pending = Some(request);
                self.photo = PhotoState::Done;
                self.clear_cache();
            }
            None => self.clear(),
        }
    }

    /// Change the note style. With an image pending this re-arms the photo
    /// and drops the cached note, since it was written in the old style.
    pub fn change_style(&mut self, style: NoteStyle) {
        self.style = style;
        if let Some(request) = self.pending.as_mut() {
            request.style = style;
            self.photo = PhotoState::Done;
            self.clear_cache();
        }
    }

    /// Forget the image and everything derived from it.
    pub fn clear(&mut self) {
        self.pending = None;
        self.photo = PhotoState::NotDone;
        self.clear_cache();
    }

    fn clear_cache(&mut self) {
        self.note = None;
        self.artifact = None;
        self.last_render_error = None;
    }

    /// Claim the pending image for one model call.
    ///
    /// Fails with [`NotesError::MissingImage`] unless an image is pending and
    /// armed. On success the photo is disarmed.
    pub fn take_submission(&mut self) -> Result<NoteRequest, NotesError> {
        match (&self.pending, self.photo) {
            (Some(request), PhotoState::Done) => {
                let request = request.clone();
                self.photo = PhotoState::NotDone;
                Ok(request)
            }
            _ => Err(NotesError::MissingImage),
        }
    }

    /// Store a freshly generated note, replacing any previous one.
    pub fn record_note(&mut self, note: GeneratedNote) {
        self.note = Some(note);
        self.artifact = None;
        self.last_render_error = None;
    }

    /// Store the outcome of a render of the cached note.
    pub fn record_render(&mut self, result: &Result<RenderedArtifact, NotesError>) {
        match result {
            Ok(artifact) => {
                self.artifact = Some(artifact.clone());
                self.last_render_error = None;
            }
            Err(e) => {
                self.artifact = None;
                self.last_render_error = Some(e.to_string());
            }
        }
    }

    pub fn phase(&self) -> SessionPhase {
        if self.artifact.is_some() {
            SessionPhase::Rendered
        } else if self.last_render_error.is_some() {
            SessionPhase::RenderFailed
        } else if self.note.is_some() {
            SessionPhase::Generated
        } else if self.photo == PhotoState::Done {
            SessionPhase::Submitted
        } else {
            SessionPhase::NotSubmitted
        }
    }

    pub fn photo(&self) -> PhotoState {
        self.photo
    }

    pub fn style(&self) -> NoteStyle {
        self.style
    }

    pub fn pending_image(&self) -> Option<&NoteRequest> {
        self.pending.as_ref()
    }

    pub fn note(&self) -> Option<&GeneratedNote> {
        self.note.as_ref()
    }

    pub fn last_render_error(&self) -> Option<&str> {
        self.last_render_error.as_deref()
    }

    /// The PDF, if one may be offered: it must exist and come from a note
    /// with non-empty markdown.
    pub fn downloadable(&self) -> Option<&RenderedArtifact> {
        match (&self.note, &self.artifact) {
            (Some(note), Some(artifact)) if note.has_content() => Some(artifact),
            _ => None,
        }
    }
}
