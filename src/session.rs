//! Turn controller: the request/execute/append cycle, the switch into
//! critique mode after the direct turns are spent, and the critique sub-loop
//! that rewrites and replays the latest proposed action.

use serde_json::Value;
use tracing::{info, warn};

use crate::computer::{computer_tool, Computer};
use crate::error::SessionError;
use crate::executor;
use crate::history::History;
use crate::items::{png_data_url, Content, ContentPart, Item, Role};
use crate::model::ModelClient;
use crate::policy::UrlPolicy;
use crate::prompt::Prompter;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Model turns per user instruction that execute proposed actions
    /// directly; every turn after that goes through the critique sub-loop.
    pub direct_turns: usize,
    /// Reply sent on the model's behalf-of-the-human when it asks a
    /// clarifying question mid-critique.
    pub auto_confirm_text: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            direct_turns: 2,
            auto_confirm_text: "Yes!".into(),
        }
    }
}

pub struct Session<C, M, P>
where
    C: Computer,
    M: ModelClient,
    P: Prompter,
{
    computer: C,
    model: M,
    prompter: P,
    policy: UrlPolicy,
    cfg: SessionConfig,
    tools: Vec<Value>,
    history: History,
}

impl<C, M, P> Session<C, M, P>
where
    C: Computer,
    M: ModelClient,
    P: Prompter,
{
    pub fn new(computer: C, model: M, prompter: P, policy: UrlPolicy, cfg: SessionConfig) -> Self {
        let tools = vec![computer_tool(&computer)];
        Self {
            computer,
            model,
            prompter,
            policy,
            cfg,
            tools,
            history: History::new(),
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Outer loop: one user instruction per iteration, until end of input.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        loop {
            let Some(line) = self.prompter.read_line("> ").await? else {
                return Ok(());
            };
            if line.trim().is_empty() {
                return Ok(());
            }
            self.run_turn(line).await?;
        }
    }

    /// Drives one user instruction to completion: model call, then either
    /// direct execution or critique, until the model closes with an
    /// assistant message.
    pub async fn run_turn(&mut self, input: String) -> Result<(), SessionError> {
        self.history.push(Item::user_text(input));
        let mut turn = 0usize;
        loop {
            let output = self.model.send(self.history.items(), &self.tools).await?;
            info!(turn, items = output.len(), "model turn");
            self.history.append(output.iter().cloned());

            if turn < self.cfg.direct_turns {
                for item in &output {
                    match item {
                        Item::Message {
                            role: Role::Assistant,
                            content,
                        } => self.prompter.show(&content.text()),
                        Item::ComputerCall {
                            call_id,
                            action,
                            pending_safety_checks,
                        } => {
                            let answered = executor::execute_call(
                                &self.computer,
                                &self.prompter,
                                &self.policy,
                                action,
                                pending_safety_checks,
                                call_id,
                            )
                            .await?;
                            self.history.push(answered);
                        }
                        _ => {}
                    }
                }
            } else {
                self.critique_pass().await?;
            }

            turn += 1;
            if self.history.last_role() == Some(Role::Assistant) {
                return Ok(());
            }
        }
    }

    // ==================== Critique sub-loop ====================

    /// Asks the human for a correction, negotiates a concrete corrective
    /// action with the model over an independent side history, then rewrites
    /// the latest proposed action in the main history and replays it under
    /// the original call_id.
    async fn critique_pass(&mut self) -> Result<(), SessionError> {
        let Some(critique) = self.prompter.read_line("critique> ").await? else {
            return Err(SessionError::Io(std::io::Error::other(
                "input closed during critique",
            )));
        };
        let shot = self.computer.screenshot().await?;

        let mut side = History::new();
        side.push(Item::Message {
            role: Role::User,
            content: Content::Parts(vec![
                ContentPart::InputText { text: critique },
                ContentPart::InputImage {
                    image_url: png_data_url(&shot),
                },
            ]),
        });

        loop {
            let output = self.model.send(side.items(), &self.tools).await?;
            side.append(output.iter().cloned());

            if side.last_role() == Some(Role::Assistant) {
                // a clarifying question, not an action yet; wave it through
                side.push(Item::user_text(self.cfg.auto_confirm_text.clone()));
                continue;
            }

            let (action, checks) = match output.last() {
                Some(Item::ComputerCall {
                    action,
                    pending_safety_checks,
                    ..
                }) => (action.clone(), pending_safety_checks.clone()),
                other => {
                    return Err(SessionError::ModelProtocol(format!(
                        "critique produced no corrective action: {other:?}"
                    )))
                }
            };

            let call_id = self.history.replace_last_action(action.clone())?;
            info!(call_id = %call_id, "replaying corrected action");
            let answered = executor::execute_call(
                &self.computer,
                &self.prompter,
                &self.policy,
                &action,
                &checks,
                &call_id,
            )
            .await;
            match answered {
                Ok(item) => self.history.push(item),
                Err(e) => {
                    warn!("corrected action failed: {e}");
                    return Err(e);
                }
            }
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{Action, SafetyCheck};
    use crate::testutil::{assistant, call, FakeComputer, ScriptedModel, ScriptedPrompter};

    fn session(
        computer: FakeComputer,
        model: ScriptedModel,
        prompter: ScriptedPrompter,
        cfg: SessionConfig,
    ) -> Session<FakeComputer, ScriptedModel, ScriptedPrompter> {
        Session::new(computer, model, prompter, UrlPolicy::default(), cfg)
    }

    #[tokio::test]
    async fn turn_zero_call_is_executed_directly() {
        let computer = FakeComputer::browser("https://example.com");
        let model = ScriptedModel::new(vec![
            vec![call(
                "c1",
                Action::Goto {
                    url: "https://example.com".into(),
                },
            )],
            vec![assistant("opened it")],
        ]);
        let prompter = ScriptedPrompter::new(vec![], vec![]);
        let mut s = session(
            computer.clone(),
            model.clone(),
            prompter.clone(),
            SessionConfig::default(),
        );

        s.run_turn("open site".into()).await.unwrap();

        // user, call, output, assistant
        let items = s.history().items();
        assert_eq!(items.len(), 4);
        assert_eq!(items[1].call_id(), Some("c1"));
        assert_eq!(items[2].call_id(), Some("c1"));
        assert!(matches!(items[2], Item::ComputerCallOutput { .. }));
        assert!(computer
            .invoked()
            .contains(&"goto https://example.com".to_string()));
        assert_eq!(prompter.shown(), vec!["opened it"]);
    }

    #[tokio::test]
    async fn loop_terminates_only_on_assistant_message() {
        let computer = FakeComputer::browser("https://example.com");
        let model = ScriptedModel::new(vec![
            vec![call("c1", Action::Wait)],
            vec![call("c2", Action::Wait)],
            vec![assistant("done")],
        ]);
        let prompter = ScriptedPrompter::new(vec![], vec![]);
        let mut s = session(
            computer,
            model.clone(),
            prompter,
            SessionConfig::default(),
        );

        s.run_turn("wait twice".into()).await.unwrap();

        assert_eq!(model.sent().len(), 3);
        assert_eq!(s.history().last_role(), Some(Role::Assistant));
    }

    #[tokio::test]
    async fn safety_refusal_aborts_the_turn_without_an_output() {
        let computer = FakeComputer::browser("https://example.com");
        let risky = Item::ComputerCall {
            call_id: "c1".into(),
            action: Action::Type {
                text: "transfer funds".into(),
            },
            pending_safety_checks: vec![SafetyCheck {
                id: "sc".into(),
                code: "sensitive".into(),
                message: "typing into a bank form".into(),
            }],
        };
        let model = ScriptedModel::new(vec![vec![risky]]);
        let prompter = ScriptedPrompter::new(vec![], vec![false]);
        let mut s = session(computer, model, prompter, SessionConfig::default());

        let err = s.run_turn("pay the invoice".into()).await.unwrap_err();
        assert!(matches!(err, SessionError::SafetyCheckRejected(_)));
        // the call is in history but was never acknowledged with an output
        assert_eq!(s.history().len(), 2);
        assert!(matches!(
            s.history().items()[1],
            Item::ComputerCall { .. }
        ));
    }

    #[tokio::test]
    async fn past_the_threshold_the_critique_sub_loop_replaces_and_replays() {
        let computer = FakeComputer::browser("https://example.com");
        let model = ScriptedModel::new(vec![
            // turns 0 and 1 run directly
            vec![call("c1", Action::Wait)],
            vec![call("c2", Action::Wait)],
            // turn 2: proposal that the human will override
            vec![call(
                "c3",
                Action::Click {
                    x: 1,
                    y: 1,
                    button: None,
                },
            )],
            // critique sub-loop: the corrective action under a fresh id
            vec![call(
                "c9",
                Action::Click {
                    x: 42,
                    y: 24,
                    button: None,
                },
            )],
            // critique mode persists; the next proposal meets end of input
            vec![call("c4", Action::Wait)],
        ]);
        // one critique, then end of input to stop the (persisting) critique mode
        let prompter = ScriptedPrompter::new(vec![Some("click the other button")], vec![]);
        let mut s = session(
            computer.clone(),
            model.clone(),
            prompter.clone(),
            SessionConfig::default(),
        );

        let err = s.run_turn("do the thing".into()).await.unwrap_err();
        assert!(matches!(err, SessionError::Io(_)));

        let items = s.history().items();
        // user, c1, out, c2, out, c3 (action replaced), out c3, c4
        assert_eq!(items.len(), 8);
        let replaced = &items[5];
        match replaced {
            Item::ComputerCall {
                call_id, action, ..
            } => {
                assert_eq!(call_id, "c3");
                assert_eq!(
                    *action,
                    Action::Click {
                        x: 42,
                        y: 24,
                        button: None
                    }
                );
            }
            other => panic!("unexpected item: {other:?}"),
        }
        // replay answered under the original id, not c9
        assert!(matches!(items[6], Item::ComputerCallOutput { .. }));
        assert_eq!(items[6].call_id(), Some("c3"));
        assert!(items.iter().all(|i| i.call_id() != Some("c9")));
        assert!(computer
            .invoked()
            .contains(&"click 42,24 left".to_string()));

        // the critique negotiation ran on a fresh side history seeded with
        // text + screenshot, not on the main history
        let side_seed = &model.sent()[3][0];
        match side_seed {
            Item::Message {
                role: Role::User,
                content: Content::Parts(parts),
            } => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(&parts[0], ContentPart::InputText { text } if text == "click the other button"));
                assert!(matches!(&parts[1], ContentPart::InputImage { .. }));
            }
            other => panic!("unexpected seed: {other:?}"),
        }
        assert_eq!(model.sent()[3].len(), 1);
    }

    #[tokio::test]
    async fn critique_auto_confirms_a_clarifying_question() {
        let computer = FakeComputer::browser("https://example.com");
        let model = ScriptedModel::new(vec![
            // direct_turns = 0 puts the very first batch through critique
            vec![call("c1", Action::Wait)],
            // sub-loop round 1: the model asks instead of acting
            vec![assistant("should I scroll down instead?")],
            // sub-loop round 2: concrete corrective action
            vec![call(
                "c5",
                Action::Scroll {
                    x: 0,
                    y: 0,
                    scroll_x: 0,
                    scroll_y: 300,
                },
            )],
        ]);
        let prompter = ScriptedPrompter::new(vec![Some("wrong spot, go lower")], vec![]);
        let cfg = SessionConfig {
            direct_turns: 0,
            ..Default::default()
        };
        let mut s = session(computer, model.clone(), prompter, cfg);

        // ends with end-of-input once critique mode comes around again
        let _ = s.run_turn("find the footer".into()).await;

        // third send = sub-loop round 2: seed, question, auto-confirmation
        let negotiation = &model.sent()[2];
        assert_eq!(negotiation.len(), 3);
        assert_eq!(negotiation[1].role(), Some(Role::Assistant));
        match &negotiation[2] {
            Item::Message {
                role: Role::User,
                content,
            } => assert_eq!(content.text(), "Yes!"),
            other => panic!("unexpected reply: {other:?}"),
        }

        // the replacement landed on c1 with the corrective scroll
        let items = s.history().items();
        match &items[1] {
            Item::ComputerCall {
                call_id, action, ..
            } => {
                assert_eq!(call_id, "c1");
                assert!(matches!(action, Action::Scroll { scroll_y: 300, .. }));
            }
            other => panic!("unexpected item: {other:?}"),
        }
        assert_eq!(items[2].call_id(), Some("c1"));
    }

    #[tokio::test]
    async fn critique_with_no_corrective_action_is_a_protocol_error() {
        let computer = FakeComputer::browser("https://example.com");
        let model = ScriptedModel::new(vec![
            vec![call("c1", Action::Wait)],
            // sub-loop returns only a reasoning item; nothing to act on
            vec![Item::Reasoning {
                body: serde_json::json!({"id": "rs_1"}),
            }],
        ]);
        let prompter = ScriptedPrompter::new(vec![Some("try again")], vec![]);
        let cfg = SessionConfig {
            direct_turns: 0,
            ..Default::default()
        };
        let mut s = session(computer, model, prompter, cfg);

        let err = s.run_turn("go".into()).await.unwrap_err();
        assert!(matches!(err, SessionError::ModelProtocol(_)));
    }

    #[tokio::test]
    async fn run_exits_cleanly_on_end_of_input() {
        let computer = FakeComputer::browser("https://example.com");
        let model = ScriptedModel::new(vec![]);
        let prompter = ScriptedPrompter::new(vec![None], vec![]);
        let mut s = session(computer, model, prompter, SessionConfig::default());
        s.run().await.unwrap();
        assert!(s.history().is_empty());
    }
}
