use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

use crate::audio::session::SessionState;

/// Custom ids of the control-panel buttons.
pub mod button_ids {
    pub const PAUSE: &str = "music_pause";
    pub const RESUME: &str = "music_resume";
    pub const SKIP: &str = "music_skip";
    pub const SHUFFLE: &str = "music_shuffle";
    pub const LEAVE: &str = "music_leave";
}

/// Control panel posted by `/player`. Pause and resume are disabled when they
/// would be a no-op for the current state.
pub fn create_player_controls(state: Option<SessionState>) -> Vec<CreateActionRow> {
    let playing = state == Some(SessionState::Playing);
    let paused = state == Some(SessionState::Paused);

    let pause_btn = CreateButton::new(button_ids::PAUSE)
        .emoji('⏸')
        .style(ButtonStyle::Secondary)
        .disabled(!playing);

    let resume_btn = CreateButton::new(button_ids::RESUME)
        .emoji('▶')
        .style(ButtonStyle::Success)
        .disabled(!paused);

    let skip_btn = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Primary);

    let shuffle_btn = CreateButton::new(button_ids::SHUFFLE)
        .emoji('🔀')
        .style(ButtonStyle::Secondary);

    let leave_btn = CreateButton::new(button_ids::LEAVE)
        .label("Leave")
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    vec![CreateActionRow::Buttons(vec![
        pause_btn,
        resume_btn,
        skip_btn,
        shuffle_btn,
        leave_btn,
    ])]
}
