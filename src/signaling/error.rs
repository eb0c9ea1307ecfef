use super::*;

#[derive(Debug, Clone, PartialEq)]
pub enum SignalingError {
    MissingParticipant,
    BadRole,
    MissingCategory,
    /// The category could not be found or allocated
    NoCategory(String),
    MissingSpace,
    NoSpace(String),
    DuplicateParticipant {
        id_rtc_participant: String,
        id_space: String,
    },
    /// The space already has a different creator
    CreatorConflict {
        id_rtc_participant: String,
        id_space: String,
    },
    /// The pipe is already bound to this participant
    AlreadyImpersonated(String),
    /// A call that needs a prior impersonation, string names what was attempted
    NotImpersonated(&'static str),
    NotCreator,
    /// An answer named a creator that is not in the space
    UnknownCreator(String),
    NoOfferFound,
}

impl SignalingError {
    /// Impersonation errors close the signaling pipe after the answer went out
    pub fn is_force_disconnect(&self) -> bool {
        matches!(
            self,
            Self::MissingParticipant
                | Self::BadRole
                | Self::MissingCategory
                | Self::NoCategory(_)
                | Self::MissingSpace
                | Self::NoSpace(_)
                | Self::DuplicateParticipant { .. }
                | Self::CreatorConflict { .. }
        )
    }
}

impl std::fmt::Display for SignalingError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::MissingParticipant => write!(
                f,
                "Bad impersonate call data, no valid signaling *somebody* ID provided"
            ),
            Self::BadRole => write!(
                f,
                "Bad impersonate call data, no valid signaling *somebody* role provided"
            ),
            Self::MissingCategory => write!(
                f,
                "Bad impersonate call data, no valid signaling space category provided"
            ),
            Self::NoCategory(id) => write!(
                f,
                "Bad impersonate call data, cannot get/alloc signaling category with \"{}\" name",
                id
            ),
            Self::MissingSpace => write!(
                f,
                "Bad impersonate call data, no valid signaling space name provided"
            ),
            Self::NoSpace(id) => write!(
                f,
                "Bad impersonate call data, cannot get/alloc signaling space with \"{}\" name",
                id
            ),
            Self::DuplicateParticipant {
                id_rtc_participant,
                id_space,
            } => write!(
                f,
                "*Somebody* \"{}\" is already in \"{}\" signaling space",
                id_rtc_participant, id_space
            ),
            Self::CreatorConflict {
                id_rtc_participant,
                id_space,
            } => write!(
                f,
                "*Somebody* \"{}\" is already in \"{}\" attempted to impersonate as creator \
                 while other creator already exist",
                id_rtc_participant, id_space
            ),
            Self::AlreadyImpersonated(id) => write!(
                f,
                "signaling pipe is already impersonated as \"{}\"",
                id
            ),
            Self::NotImpersonated(what) => {
                write!(f, "only connected signaling clients can {}", what)
            }
            Self::NotCreator => write!(f, "only creator can publish offers"),
            Self::UnknownCreator(id) => write!(
                f,
                "answer published with invalid server holder reference: {}",
                id
            ),
            Self::NoOfferFound => write!(f, "no offer found"),
        }
    }
}

impl Error for SignalingError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_impersonation_errors_disconnect() {
        assert!(SignalingError::MissingParticipant.is_force_disconnect());
        assert!(SignalingError::CreatorConflict {
            id_rtc_participant: "b".to_string(),
            id_space: "s".to_string(),
        }
        .is_force_disconnect());
        assert!(!SignalingError::NotCreator.is_force_disconnect());
        assert!(!SignalingError::NoOfferFound.is_force_disconnect());
    }

    #[test]
    fn messages_name_the_offender() {
        let e = SignalingError::DuplicateParticipant {
            id_rtc_participant: "joiner-1".to_string(),
            id_space: "lobby".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "*Somebody* \"joiner-1\" is already in \"lobby\" signaling space"
        );
        assert_eq!(
            SignalingError::NotImpersonated("publish offers").to_string(),
            "only connected signaling clients can publish offers"
        );
    }
}
