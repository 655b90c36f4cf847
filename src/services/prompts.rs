//! Prompt playback queue
//!
//! Steps queue audio files; the queue plays them one at a time through the
//! call. The platform reports each finished file as a `PromptPlayed` event
//! and the runtime calls [`PromptQueue::notify_play_finished`] before the
//! focused step sees it.

use crate::runtime::{CallControl, TelephonyError};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct PromptQueue {
    audio_folder: PathBuf,
    pending: VecDeque<PathBuf>,
    playing: Option<PathBuf>,
}

impl PromptQueue {
    pub fn new(audio_folder: impl Into<PathBuf>) -> Self {
        Self {
            audio_folder: audio_folder.into(),
            pending: VecDeque::new(),
            playing: None,
        }
    }

    pub fn audio_folder(&self) -> &Path {
        &self.audio_folder
    }

    /// Relative prompt names resolve against the project audio folder
    pub fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.audio_folder.join(path)
        }
    }

    /// Append prompts and start playback if nothing is playing
    pub async fn enqueue(
        &mut self,
        call: &dyn CallControl,
        files: Vec<String>,
    ) -> Result<(), TelephonyError> {
        for file in &files {
            let path = self.resolve(file);
            self.pending.push_back(path);
        }
        self.play_next_if_idle(call).await
    }

    /// The current file finished; move on to the next one
    pub async fn notify_play_finished(
        &mut self,
        call: &dyn CallControl,
    ) -> Result<(), TelephonyError> {
        if let Some(done) = self.playing.take() {
            tracing::trace!(file = %done.display(), "Prompt finished");
        }
        self.play_next_if_idle(call).await
    }

    /// Drop pending prompts and stop the one playing (caller barge-in)
    pub async fn stop(&mut self, call: &dyn CallControl) -> Result<(), TelephonyError> {
        self.pending.clear();
        if self.playing.take().is_some() {
            call.stop_audio().await?;
        }
        Ok(())
    }

    /// Forget everything without touching the call (it is already gone)
    pub fn clear(&mut self) {
        self.pending.clear();
        self.playing = None;
    }

    pub fn is_idle(&self) -> bool {
        self.playing.is_none() && self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    async fn play_next_if_idle(&mut self, call: &dyn CallControl) -> Result<(), TelephonyError> {
        if self.playing.is_some() {
            return Ok(());
        }
        if let Some(next) = self.pending.pop_front() {
            tracing::debug!(file = %next.display(), "Playing prompt");
            call.play_audio(&next).await?;
            self.playing = Some(next);
        }
        Ok(())
    }
}
