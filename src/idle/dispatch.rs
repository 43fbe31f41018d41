//! Outgoing message composition for fired events.

use std::fmt::Display;

use chrono::{DateTime, TimeZone};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::constants::DELAYED_NOTICE;
use crate::util::substitute_params;

use super::candidate::{EventKind, TimerEvent};
use super::settings::{SendAs, Settings};

/// What the host knows at fire time.
#[derive(Clone, Copy, Debug)]
pub struct HostContext<'a> {
    /// The host is mid-generation; sending now would collide.
    pub generating: bool,
    pub char_name: &'a str,
    pub user_name: &'a str,
}

/// A composed message and the channel to send it through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outgoing {
    pub channel: SendAs,
    pub text: String,
    pub include_prompt: bool,
    pub kind: EventKind,
    pub delayed: bool,
}

/// Pick one non-blank idle prompt uniformly at random.
pub fn pick_prompt<R: Rng + ?Sized>(settings: &Settings, rng: &mut R) -> Option<String> {
    settings
        .active_prompts()
        .choose(rng)
        .map(|prompt| prompt.to_string())
}

/// `[YYYY-MM-DD HH:MM:SS] ` + optional delayed notice + prompt.
pub fn compose_message<Tz>(prompt: &str, delayed: bool, now: &DateTime<Tz>, ctx: &HostContext<'_>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let timestamp = now.format("%Y-%m-%d %H:%M:%S");
    if delayed {
        let notice = substitute_params(DELAYED_NOTICE, ctx.char_name, ctx.user_name);
        format!("[{timestamp}] {notice} {prompt}")
    } else {
        format!("[{timestamp}] {prompt}")
    }
}

/// Build the outgoing message for a fired event.
///
/// Idle replies use the configured channel and a random prompt; schedules
/// are addressed as the character and fall back to a random prompt when
/// their own is blank. Returns `None` when there is nothing to say.
pub fn build_outgoing<Tz, R>(
    event: &TimerEvent,
    settings: &Settings,
    ctx: &HostContext<'_>,
    now: &DateTime<Tz>,
    rng: &mut R,
) -> Option<Outgoing>
where
    Tz: TimeZone,
    Tz::Offset: Display,
    R: Rng + ?Sized,
{
    let (channel, prompt) = match event {
        TimerEvent::IdleReply { .. } => (settings.send_as, pick_prompt(settings, rng)?),
        TimerEvent::Once { prompt, .. } | TimerEvent::Daily { prompt, .. } => {
            let prompt = if prompt.trim().is_empty() {
                pick_prompt(settings, rng)?
            } else {
                prompt.clone()
            };
            (SendAs::Char, prompt)
        }
    };

    let delayed = event.is_delayed();
    Some(Outgoing {
        channel,
        text: compose_message(&prompt, delayed, now, ctx),
        include_prompt: settings.include_prompt,
        kind: event.kind(),
        delayed,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use chrono::Utc;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn ctx() -> HostContext<'static> {
        HostContext {
            generating: false,
            char_name: "Ava",
            user_name: "Sam",
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 3).unwrap()
    }

    #[test]
    fn plain_message_gets_timestamp_tag() {
        let text = compose_message("*yawns*", false, &now(), &ctx());
        assert_eq!(text, "[2024-03-09 07:05:03] *yawns*");
    }

    #[test]
    fn delayed_message_gets_notice() {
        let text = compose_message("*yawns*", true, &now(), &ctx());
        assert_eq!(
            text,
            "[2024-03-09 07:05:03] Ava's previous message never went out and needs to tell Sam *yawns*"
        );
    }

    #[test]
    fn idle_uses_configured_channel_and_stock_prompt() {
        let settings = Settings {
            send_as: SendAs::Sys,
            prompts: vec!["".into(), "only one".into(), "  ".into()],
            include_prompt: true,
            ..Settings::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let out = build_outgoing(
            &TimerEvent::IdleReply { is_delayed: false },
            &settings,
            &ctx(),
            &now(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(out.channel, SendAs::Sys);
        assert!(out.text.ends_with("only one"));
        assert!(out.include_prompt);
        assert_eq!(out.kind, EventKind::IdleReply);
    }

    #[test]
    fn schedules_go_out_as_character() {
        let settings = Settings {
            send_as: SendAs::Raw,
            ..Settings::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let event = TimerEvent::Daily {
            index: 0,
            time: "07:05".into(),
            prompt: "Good morning!".into(),
        };
        let out = build_outgoing(&event, &settings, &ctx(), &now(), &mut rng).unwrap();
        assert_eq!(out.channel, SendAs::Char);
        assert_eq!(out.text, "[2024-03-09 07:05:03] Good morning!");

        let blank = TimerEvent::Once {
            index: 0,
            time: "2024-03-09T07:05".into(),
            prompt: " ".into(),
        };
        let out = build_outgoing(&blank, &settings, &ctx(), &now(), &mut rng).unwrap();
        assert!(settings.prompts.iter().any(|p| out.text.ends_with(p.as_str())));
    }

    #[test]
    fn prompt_choice_is_roughly_uniform() {
        let settings = Settings {
            prompts: vec!["a".into(), "b".into(), "c".into()],
            ..Settings::default()
        };
        let mut rng = StdRng::seed_from_u64(99);
        let mut counts = [0usize; 3];
        for _ in 0..3_000 {
            match pick_prompt(&settings, &mut rng).unwrap().as_str() {
                "a" => counts[0] += 1,
                "b" => counts[1] += 1,
                _ => counts[2] += 1,
            }
        }
        assert!(counts.iter().all(|c| (800..=1_200).contains(c)), "{counts:?}");
    }

    #[test]
    fn no_prompts_means_nothing_to_send() {
        let settings = Settings {
            prompts: Vec::new(),
            ..Settings::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let out = build_outgoing(
            &TimerEvent::IdleReply { is_delayed: true },
            &settings,
            &ctx(),
            &now(),
            &mut rng,
        );
        assert!(out.is_none());
    }
}
