use std::rc::Rc;

use log::{error, trace};

use crate::{Channel, Error, Result};

/// Condition a trigger match tests a channel for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MatchKind {
    /// Logic level low.
    Zero,
    /// Logic level high.
    One,
    /// Rising edge.
    Rising,
    /// Falling edge.
    Falling,
    /// Any edge.
    Edge,
    /// Analog value over the threshold.
    Over,
    /// Analog value under the threshold.
    Under,
}

/// One condition within a trigger stage.
///
/// The channel and the match kind are filled in by whoever builds the
/// trigger; [`Trigger::validate`] reports matches left incomplete.
#[derive(Clone, Debug)]
pub struct TriggerMatch {
    /// The channel the condition applies to.
    pub channel: Option<Rc<Channel>>,
    /// The condition to test for.
    pub kind: Option<MatchKind>,
}

/// A set of match conditions that must hold simultaneously.
#[derive(Clone, Debug)]
pub struct TriggerStage {
    /// Position of this stage in the trigger sequence.
    pub number: usize,
    /// Conditions belonging to this stage.
    pub matches: Vec<TriggerMatch>,
}

/// A trigger: a sequence of stages evaluated in order.
#[derive(Clone, Debug)]
pub struct Trigger {
    /// Caller-chosen name for diagnostics.
    pub name: String,
    /// The stages making up the trigger.
    pub stages: Vec<TriggerStage>,
}

impl Trigger {
    /// Create an empty trigger with the given name.
    pub fn new(name: &str) -> Trigger {
        Trigger {
            name: name.to_owned(),
            stages: Vec::new(),
        }
    }

    /// Structurally validate the trigger.
    ///
    /// Every stage must carry at least one match, and every match must name
    /// a channel and a match kind. Diagnostic only; the trigger is not
    /// modified. A session validates its trigger when started.
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            error!("no trigger stages defined");
            return Err(Error::BadArg("trigger has no stages"));
        }

        trace!("checking trigger {}", self.name);
        for stage in &self.stages {
            if stage.matches.is_empty() {
                error!("stage {} has no matches defined", stage.number);
                return Err(Error::BadArg("trigger stage has no matches"));
            }
            for m in &stage.matches {
                let channel = match &m.channel {
                    Some(channel) => channel,
                    None => {
                        error!("stage {} match has no channel", stage.number);
                        return Err(Error::BadArg("trigger match has no channel"));
                    }
                };
                let kind = match m.kind {
                    Some(kind) => kind,
                    None => {
                        error!("stage {} match is not defined", stage.number);
                        return Err(Error::BadArg("trigger match has no match kind"));
                    }
                };
                trace!(
                    "stage {} match on channel {}, match {:?}",
                    stage.number,
                    channel.name(),
                    kind
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelKind;

    fn match_on(channel: Option<Rc<Channel>>, kind: Option<MatchKind>) -> TriggerMatch {
        TriggerMatch { channel, kind }
    }

    #[test]
    fn complete_trigger_passes() {
        let ch = Channel::new(0, ChannelKind::Logic, "D0");
        let trigger = Trigger {
            name: "edge".to_owned(),
            stages: vec![TriggerStage {
                number: 0,
                matches: vec![match_on(Some(ch), Some(MatchKind::Rising))],
            }],
        };
        assert!(trigger.validate().is_ok());
    }

    #[test]
    fn empty_stage_list_rejected() {
        let trigger = Trigger::new("empty");
        assert!(matches!(trigger.validate(), Err(Error::BadArg(_))));
    }

    #[test]
    fn stage_without_matches_rejected() {
        let trigger = Trigger {
            name: "hollow".to_owned(),
            stages: vec![TriggerStage {
                number: 0,
                matches: Vec::new(),
            }],
        };
        assert!(matches!(trigger.validate(), Err(Error::BadArg(_))));
    }

    #[test]
    fn match_without_channel_rejected() {
        let trigger = Trigger {
            name: "nochan".to_owned(),
            stages: vec![TriggerStage {
                number: 0,
                matches: vec![match_on(None, Some(MatchKind::One))],
            }],
        };
        assert!(matches!(trigger.validate(), Err(Error::BadArg(_))));
    }

    #[test]
    fn match_without_kind_rejected() {
        let ch = Channel::new(1, ChannelKind::Analog, "A0");
        let trigger = Trigger {
            name: "nokind".to_owned(),
            stages: vec![TriggerStage {
                number: 0,
                matches: vec![match_on(Some(ch), None)],
            }],
        };
        assert!(matches!(trigger.validate(), Err(Error::BadArg(_))));
    }
}
