//! Slash-command dispatch and handler implementations.
//!
//! Every `/command` typed by the user is routed through [`App::handle_command`]
//! and dispatched to the appropriate handler in a focused submodule:
//!
//! | Module      | Commands                                |
//! |-------------|-----------------------------------------|
//! | `idle`      | `/idle`, `/set`, `/backend`             |
//! | `schedules` | `/prompts`, `/once`, `/daily`           |
//! | `openai`    | `/key`                                  |

mod idle;
mod openai;
mod schedules;

use super::App;
use super::log_src;
use super::logging::LogLevel;

// ── Command dispatch ─────────────────────────────────────────────────

impl App {
    /// Route a slash-command to the matching handler.
    pub(crate) fn handle_command(&mut self, line: &str) -> anyhow::Result<()> {
        let mut parts = line.split_whitespace();
        let cmd = parts.next().unwrap_or("");

        match cmd {
            "/help" => self.show_help(),
            "/quit" | "/exit" => self.should_quit = true,
            "/clear" => {
                self.transcript.clear();
                self.logs.clear();
            }
            "/idle" => self.handle_idle_command(parts.collect()),
            "/set" => self.handle_set_command(parts.collect()),
            "/backend" => self.handle_backend_command(parts.collect()),
            "/prompts" | "/prompt" => self.handle_prompts_command(parts.collect()),
            "/once" => self.handle_once_command(parts.collect()),
            "/daily" => self.handle_daily_command(parts.collect()),
            "/key" => self.handle_key_command(parts.collect()),
            _ => log_src!(self, LogLevel::Warn, format!("Unknown command: {cmd}")),
        }

        Ok(())
    }
}

// ── Help ─────────────────────────────────────────────────────────────

impl App {
    fn show_help(&mut self) {
        let lines = [
            "━━━  idle-nudge: keeps the conversation going  ━━━",
            "",
            "Just type to chat. When you go quiet, the character speaks up.",
            "",
            "Idle replies",
            "  /idle                   Toggle idle replies on/off",
            "  /idle on|off            Switch explicitly",
            "  /idle status            Show settings and the next event",
            "  /idle test              Fire a test idle message in 2 seconds",
            "",
            "Settings",
            "  /set timer <secs>       Idle delay (upper bound with random)",
            "  /set min <secs>         Lower bound of the random delay",
            "  /set random on|off      Randomise the delay",
            "  /set usetimer on|off    Use the idle timer at all",
            "  /set sendas <ch>        user | char | sys | raw",
            "  /set include on|off     Show quiet prompts in the chat",
            "",
            "Prompts",
            "  /prompts                List idle prompts",
            "  /prompts add <text>     Add a prompt",
            "  /prompts remove <n>     Remove prompt n",
            "  /prompts clear|reset    Remove all / restore the stock prompts",
            "",
            "Schedules",
            "  /once                   List one-time messages",
            "  /once add <when> <msg>  Add (when = YYYY-MM-DDTHH:MM)",
            "  /once remove|toggle <n> Remove or enable/disable entry n",
            "  /daily                  List daily messages",
            "  /daily add <HH:MM> <msg> Add a daily message",
            "  /daily remove|toggle <n> Remove or enable/disable entry n",
            "",
            "Timer backend",
            "  /backend                Show timer backend status",
            "  /backend reconnect      Retry the timer service now",
            "",
            "Other",
            "  /key <key>              Set the OpenAI key for this session",
            "  /clear                  Clear chat and activity",
            "  /quit                   Exit",
        ];
        for line in lines {
            self.log(LogLevel::Info, line.to_string());
        }
    }
}
