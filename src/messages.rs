use bevy::prelude::*;
use std::collections::VecDeque;

use crate::events::GameEventBus;
use crate::game_runtime::SimSet;
use crate::input::VirtualInput;
use crate::script::{ScriptAction, ScriptQueue};

pub struct MessagesPlugin;

impl Plugin for MessagesPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(MessageQueue::default()).add_systems(
            FixedUpdate,
            drive_messages
                .in_set(SimSet::Script)
                .before(crate::script::apply_script_actions)
                .run_if(crate::game_runtime::gameplay_systems_enabled),
        );
    }
}

#[derive(Clone)]
pub struct ChoiceOption {
    pub label: String,
    pub actions: Vec<ScriptAction>,
}

#[derive(Clone)]
pub enum Message {
    Line {
        text: String,
        blocks_player: bool,
        on_dismiss: Vec<ScriptAction>,
    },
    Choice {
        prompt: String,
        options: Vec<ChoiceOption>,
    },
}

/// Queued narrative text and prompts. Only the front entry is displayed; the
/// player acknowledges or selects to advance. The simulation keeps ticking
/// while a message is up; only the *script* behind it is suspended.
#[derive(Resource, Default)]
pub struct MessageQueue {
    queue: VecDeque<Message>,
    pub selected: usize,
    announced: bool,
}

impl MessageQueue {
    pub fn show_message(
        &mut self,
        text: impl Into<String>,
        blocks_player: bool,
        on_dismiss: Vec<ScriptAction>,
    ) {
        self.queue.push_back(Message::Line {
            text: text.into(),
            blocks_player,
            on_dismiss,
        });
    }

    pub fn show_choice(&mut self, prompt: impl Into<String>, options: Vec<ChoiceOption>) {
        self.queue.push_back(Message::Choice {
            prompt: prompt.into(),
            options,
        });
    }

    pub fn current(&self) -> Option<&Message> {
        self.queue.front()
    }

    pub fn is_open(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Choices always hold the player still; plain lines only when authored
    /// as blocking.
    pub fn blocks_player(&self) -> bool {
        match self.queue.front() {
            Some(Message::Line { blocks_player, .. }) => *blocks_player,
            Some(Message::Choice { .. }) => true,
            None => false,
        }
    }

    /// Advance past the front entry, returning the continuation actions.
    pub fn dismiss(&mut self) -> Vec<ScriptAction> {
        let actions = match self.queue.pop_front() {
            Some(Message::Line { on_dismiss, .. }) => on_dismiss,
            Some(Message::Choice { options, .. }) => options
                .into_iter()
                .nth(self.selected)
                .map(|o| o.actions)
                .unwrap_or_default(),
            None => Vec::new(),
        };
        self.selected = 0;
        self.announced = false;
        actions
    }

    pub fn move_selection(&mut self, delta: i32) {
        if let Some(Message::Choice { options, .. }) = self.queue.front() {
            let len = options.len().max(1) as i32;
            self.selected = (self.selected as i32 + delta).rem_euclid(len) as usize;
        }
    }
}

fn drive_messages(
    input: Res<VirtualInput>,
    mut messages: ResMut<MessageQueue>,
    mut queue: ResMut<ScriptQueue>,
    mut events: ResMut<GameEventBus>,
) {
    if !messages.announced {
        let announce = match messages.current() {
            Some(Message::Line { text, .. }) => {
                Some(("message_shown", serde_json::json!({ "text": text })))
            }
            Some(Message::Choice { prompt, options }) => {
                let labels: Vec<&str> = options.iter().map(|o| o.label.as_str()).collect();
                Some((
                    "choice_shown",
                    serde_json::json!({ "prompt": prompt, "options": labels }),
                ))
            }
            None => None,
        };
        if let Some((name, data)) = announce {
            events.emit(name, data, None);
            messages.announced = true;
        }
    }

    let is_choice = match messages.current() {
        Some(Message::Line { .. }) => false,
        Some(Message::Choice { .. }) => true,
        None => return,
    };

    if is_choice {
        if input.just_pressed("up") {
            messages.move_selection(-1);
        }
        if input.just_pressed("down") {
            messages.move_selection(1);
        }
        if input.just_pressed("use") {
            let index = messages.selected;
            events.emit("choice_selected", serde_json::json!({ "index": index }), None);
            let actions = messages.dismiss();
            queue.enqueue(actions);
        }
    } else if input.just_pressed("use") {
        events.emit("message_dismissed", serde_json::json!({}), None);
        let actions = messages.dismiss();
        queue.enqueue(actions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_dismiss_in_queue_order() {
        let mut q = MessageQueue::default();
        q.show_message("first", true, Vec::new());
        q.show_message("second", false, Vec::new());
        assert!(q.blocks_player());
        q.dismiss();
        assert!(q.is_open());
        assert!(!q.blocks_player());
        q.dismiss();
        assert!(!q.is_open());
    }

    #[test]
    fn choice_selection_wraps_and_returns_the_chosen_branch() {
        let mut q = MessageQueue::default();
        q.show_choice(
            "Pull the lever?",
            vec![
                ChoiceOption {
                    label: "Yes".into(),
                    actions: vec![ScriptAction::EmitEvent {
                        name: "lever_yes".into(),
                        data: serde_json::Value::Null,
                    }],
                },
                ChoiceOption {
                    label: "No".into(),
                    actions: Vec::new(),
                },
            ],
        );
        assert!(q.blocks_player());
        q.move_selection(-1);
        assert_eq!(q.selected, 1);
        q.move_selection(1);
        assert_eq!(q.selected, 0);
        let actions = q.dismiss();
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn dismissing_an_empty_queue_is_a_no_op() {
        let mut q = MessageQueue::default();
        assert!(q.dismiss().is_empty());
        assert!(!q.blocks_player());
    }
}
