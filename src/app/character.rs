//! The chat character and the user it talks to.
//!
//! Names fill the `{{char}}` / `{{user}}` macros in idle messages; the
//! persona becomes the system instructions for every generation.

use crate::constants::{DEFAULT_CHAR_NAME, DEFAULT_USER_NAME};
use crate::util::env_first;

#[derive(Clone, Debug)]
pub struct Character {
    pub name: String,
    pub user_name: String,
    pub persona: String,
}

impl Default for Character {
    fn default() -> Self {
        Self {
            name: DEFAULT_CHAR_NAME.to_string(),
            user_name: DEFAULT_USER_NAME.to_string(),
            persona: "You are a warm, curious companion who keeps the conversation going. \
                      Reply in a few sentences and stay in character."
                .to_string(),
        }
    }
}

impl Character {
    /// Defaults overridden by `IDLE_CHAR_NAME`, `IDLE_USER_NAME` and `IDLE_PERSONA`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            name: env_first(&["IDLE_CHAR_NAME"]).unwrap_or(defaults.name),
            user_name: env_first(&["IDLE_USER_NAME"]).unwrap_or(defaults.user_name),
            persona: env_first(&["IDLE_PERSONA"]).unwrap_or(defaults.persona),
        }
    }

    /// System instructions sent with every generation.
    pub fn instructions(&self) -> String {
        format!(
            "{}\nYour name is {}. You are talking with {}. Messages that start with a \
             [YYYY-MM-DD HH:MM:SS] tag were sent on a timer; treat the tag as the current time.",
            self.persona, self.name, self.user_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_name_both_sides() {
        let character = Character {
            name: "Ava".into(),
            user_name: "Sam".into(),
            persona: "Be kind.".into(),
        };
        let text = character.instructions();
        assert!(text.starts_with("Be kind."));
        assert!(text.contains("Your name is Ava"));
        assert!(text.contains("talking with Sam"));
    }
}
