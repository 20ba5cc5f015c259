//! Live broadcast session operations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use classcast_admission::{AdmissionController, AdmissionDecision, RejectReason, SessionRegistry};
use classcast_core::config::live::LiveConfig;
use classcast_core::error::AppError;
use classcast_core::events::LiveEvent;
use classcast_core::result::AppResult;
use classcast_core::types::Capability;
use classcast_entity::device::IdentityKey;
use classcast_entity::live::{
    ControlAction, ControlRecord, LiveSession, LiveSettings, LiveStatus, Participant,
};
use classcast_entity::role::ParticipantRole;

use crate::roster::RosterStore;

/// Command to schedule a new live session.
#[derive(Debug, Clone)]
pub struct StartLiveSession {
    /// The credential the session broadcasts under.
    pub credential_id: Uuid,
    /// The presenter who owns the session.
    pub presenter_id: Uuid,
    /// Title shown to participants.
    pub title: String,
    /// When the session should begin; defaults to now.
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Media toggles; defaults come from configuration.
    pub settings: Option<LiveSettings>,
}

/// How a joining actor proves who they are.
#[derive(Debug, Clone)]
pub enum JoinIdentity {
    /// The presenter identified by their presenter id.
    Presenter {
        /// Claimed presenter id, checked against the session's owner.
        presenter_id: Uuid,
    },
    /// A device identified by its resolved identity key.
    Device {
        /// Stable device identity key.
        identity_key: IdentityKey,
        /// Session token for the device-session created on admission.
        session_token: String,
    },
}

/// A join request against a live session.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    /// The role the actor joins with.
    pub role: ParticipantRole,
    /// Identity evidence matching the role.
    pub identity: JoinIdentity,
    /// Name shown in the roster.
    pub display_name: String,
}

/// Orchestrates the live-session state machine.
///
/// Owns `LiveSession` and `Participant` rows exclusively. Attendee joins
/// consume credential capacity through the admission controller; device
/// sessions are never mutated here. Storage failures on this path surface
/// as retryable errors rather than failing open, since a wrong answer
/// about session state is worse than asking the client to retry.
pub struct LiveSessionService {
    roster: Arc<dyn RosterStore>,
    registry: Arc<dyn SessionRegistry>,
    admission: Arc<AdmissionController>,
    config: LiveConfig,
}

impl LiveSessionService {
    /// Creates a new service.
    pub fn new(
        roster: Arc<dyn RosterStore>,
        registry: Arc<dyn SessionRegistry>,
        admission: Arc<AdmissionController>,
        config: LiveConfig,
    ) -> Self {
        Self {
            roster,
            registry,
            admission,
            config,
        }
    }

    fn emit(&self, event: LiveEvent) {
        info!(event = ?event, "Live session event");
    }

    fn default_settings(&self) -> LiveSettings {
        let defaults = &self.config.default_settings;
        LiveSettings {
            audio_enabled: defaults.audio_enabled,
            video_enabled: defaults.video_enabled,
            recording_enabled: defaults.recording_enabled,
            chat_enabled: defaults.chat_enabled,
        }
    }

    /// Schedules a live session under a credential.
    ///
    /// At most one non-terminal session may exist per credential; the
    /// conflict error carries the existing meeting id so clients can offer
    /// to rejoin it. The participant ceiling is the credential's device
    /// capacity times the configured headroom, tolerating the overlap
    /// window where a rejoining device briefly holds two roster records.
    pub async fn start(
        &self,
        role: ParticipantRole,
        cmd: StartLiveSession,
    ) -> AppResult<LiveSession> {
        if !role.allows(Capability::StartSession) {
            return Err(AppError::forbidden(format!(
                "Role {role} may not start live sessions"
            )));
        }

        if let Some(existing) = self
            .roster
            .find_non_terminal_by_credential(cmd.credential_id)
            .await?
        {
            return Err(AppError::conflict(
                "A live session is already running for this credential",
            )
            .with_conflicting_id(existing.id));
        }

        let credential = self
            .registry
            .find_credential(cmd.credential_id)
            .await?
            .ok_or_else(|| AppError::not_found("No such credential"))?;
        if !credential.is_usable() {
            return Err(AppError::inactive("Credential is deactivated or expired"));
        }

        let max_participants =
            credential.capacity * self.config.headroom_multiplier as i32;
        let settings = cmd.settings.unwrap_or_else(|| self.default_settings());
        let session = self
            .roster
            .create_session(
                cmd.credential_id,
                cmd.presenter_id,
                &cmd.title,
                cmd.scheduled_start.unwrap_or_else(Utc::now),
                max_participants,
                &settings,
            )
            .await?;

        info!(
            meeting_id = %session.id,
            credential_id = %session.credential_id,
            max_participants,
            "Live session scheduled"
        );
        Ok(session)
    }

    /// Joins an actor into a live session.
    ///
    /// The first join of a scheduled session drives
    /// `Scheduled → Starting → Live` and stamps the actual start. A join
    /// that brings the roster to its ceiling flips the session to `Full`.
    /// Rejoining with an open roster record is idempotent.
    pub async fn join(&self, meeting_id: Uuid, request: JoinRequest) -> AppResult<Participant> {
        if !request.role.allows(Capability::JoinSession) {
            return Err(AppError::forbidden(format!(
                "Role {} may not join live sessions",
                request.role
            )));
        }

        let session = self
            .roster
            .find_session(meeting_id)
            .await?
            .ok_or_else(|| AppError::not_found("No such live session"))?;
        if session.is_terminal() {
            return Err(AppError::inactive(format!(
                "Live session is {}",
                session.status
            )));
        }

        let participant_key = match (&request.role, &request.identity) {
            (ParticipantRole::Presenter, JoinIdentity::Presenter { presenter_id }) => {
                if *presenter_id != session.presenter_id {
                    return Err(AppError::forbidden(
                        "Presenter identity does not match this session",
                    ));
                }
                presenter_id.to_string()
            }
            (
                ParticipantRole::Attendee | ParticipantRole::Manager,
                JoinIdentity::Device { identity_key, .. },
            ) => identity_key.as_str().to_string(),
            _ => {
                return Err(AppError::validation(
                    "Join identity does not match the requested role",
                ));
            }
        };

        // Device reconnecting with an open roster record: nothing to do.
        if let Some(open) = self
            .roster
            .find_open_participant(meeting_id, &participant_key)
            .await?
        {
            return Ok(open);
        }

        if session.is_at_capacity() {
            return Err(AppError::capacity_exceeded("Live session is full"));
        }

        // Attendees occupy credential capacity; presenters and managers do
        // not go through admission.
        if request.role == ParticipantRole::Attendee {
            if let JoinIdentity::Device {
                identity_key,
                session_token,
            } = &request.identity
            {
                let decision = self
                    .admission
                    .try_admit(
                        session.credential_id,
                        identity_key.clone(),
                        session_token.clone(),
                    )
                    .await?;
                match decision {
                    AdmissionDecision::Rejected {
                        reason: RejectReason::CapacityExceeded,
                    } => {
                        return Err(AppError::capacity_exceeded(
                            "Credential has no device capacity left",
                        ));
                    }
                    AdmissionDecision::Rejected {
                        reason: RejectReason::CredentialUnavailable,
                    } => {
                        return Err(AppError::forbidden(
                            "Credential is unavailable for admission",
                        ));
                    }
                    decision => {
                        if decision.is_degraded() {
                            warn!(
                                meeting_id = %meeting_id,
                                identity_key = %identity_key,
                                "Attendee admitted in degraded mode"
                            );
                        }
                    }
                }
            }
        }

        // First join of a scheduled session brings it live.
        if matches!(session.status, LiveStatus::Scheduled | LiveStatus::Starting) {
            let now = Utc::now();
            if self
                .roster
                .transition_status(meeting_id, LiveStatus::Scheduled, LiveStatus::Starting)
                .await?
            {
                self.roster.set_started(meeting_id, now).await?;
            }
            // Completes our own transition or one a crashed predecessor
            // left half-done.
            if self
                .roster
                .transition_status(meeting_id, LiveStatus::Starting, LiveStatus::Live)
                .await?
            {
                self.emit(LiveEvent::Started {
                    meeting_id,
                    credential_id: session.credential_id,
                    presenter_id: session.presenter_id,
                });
            }
        }

        let participant = self
            .roster
            .insert_participant(
                meeting_id,
                &participant_key,
                request.role,
                &request.display_name,
            )
            .await?;
        let count = self.roster.adjust_participant_count(meeting_id, 1).await?;

        if count >= session.max_participants
            && self
                .roster
                .transition_status(meeting_id, LiveStatus::Live, LiveStatus::Full)
                .await?
        {
            self.emit(LiveEvent::BecameFull {
                meeting_id,
                max_participants: session.max_participants.max(0) as u32,
            });
        }

        self.emit(LiveEvent::ParticipantJoined {
            meeting_id,
            participant_key,
            participant_count: count.max(0) as u32,
        });
        Ok(participant)
    }

    /// Closes a participant's open roster record. Idempotent: returns false
    /// when no open record existed.
    pub async fn leave(&self, meeting_id: Uuid, participant_key: &str) -> AppResult<bool> {
        let session = self
            .roster
            .find_session(meeting_id)
            .await?
            .ok_or_else(|| AppError::not_found("No such live session"))?;

        if !self
            .roster
            .close_participant(meeting_id, participant_key, Utc::now())
            .await?
        {
            return Ok(false);
        }

        let count = self.roster.adjust_participant_count(meeting_id, -1).await?;
        if count < session.max_participants {
            // Conditional on Full, harmless otherwise.
            self.roster
                .transition_status(meeting_id, LiveStatus::Full, LiveStatus::Live)
                .await?;
        }

        self.emit(LiveEvent::ParticipantLeft {
            meeting_id,
            participant_key: participant_key.to_string(),
            participant_count: count.max(0) as u32,
        });
        Ok(true)
    }

    /// Ends a live session, closing every open roster record.
    ///
    /// Duration is measured from the actual start, or the scheduled start
    /// when the session was never joined.
    pub async fn end(
        &self,
        meeting_id: Uuid,
        actor_id: Uuid,
        role: ParticipantRole,
    ) -> AppResult<LiveSession> {
        let session = self
            .authorize_terminal(meeting_id, actor_id, role, Capability::EndSession)
            .await?;

        let now = Utc::now();
        let duration_seconds = (now - session.effective_start()).num_seconds().max(0);
        if !self
            .roster
            .finish(meeting_id, LiveStatus::Ended, now, duration_seconds)
            .await?
        {
            return Err(AppError::inactive("Live session already terminated"));
        }

        let closed = self.roster.close_all_participants(meeting_id, now).await?;
        if closed > 0 {
            self.roster
                .adjust_participant_count(meeting_id, -(closed as i32))
                .await?;
        }

        self.emit(LiveEvent::Ended {
            meeting_id,
            duration_seconds,
        });
        self.roster
            .find_session(meeting_id)
            .await?
            .ok_or_else(|| AppError::not_found("No such live session"))
    }

    /// Cancels a live session from any non-terminal state.
    pub async fn cancel(
        &self,
        meeting_id: Uuid,
        actor_id: Uuid,
        role: ParticipantRole,
    ) -> AppResult<LiveSession> {
        let session = self
            .authorize_terminal(meeting_id, actor_id, role, Capability::CancelSession)
            .await?;

        let now = Utc::now();
        // A session cancelled before anyone joined never ran.
        let duration_seconds = session
            .started_at
            .map(|started| (now - started).num_seconds().max(0))
            .unwrap_or(0);
        if !self
            .roster
            .finish(meeting_id, LiveStatus::Cancelled, now, duration_seconds)
            .await?
        {
            return Err(AppError::inactive("Live session already terminated"));
        }

        let closed = self.roster.close_all_participants(meeting_id, now).await?;
        if closed > 0 {
            self.roster
                .adjust_participant_count(meeting_id, -(closed as i32))
                .await?;
        }

        self.emit(LiveEvent::Cancelled { meeting_id });
        self.roster
            .find_session(meeting_id)
            .await?
            .ok_or_else(|| AppError::not_found("No such live session"))
    }

    /// Issues a control action against a participant and appends it to the
    /// session's control log. `Remove` also performs the target's leave
    /// bookkeeping. The presenter may never be targeted.
    pub async fn control(
        &self,
        meeting_id: Uuid,
        actor_id: Uuid,
        role: ParticipantRole,
        target: &str,
        action: ControlAction,
    ) -> AppResult<ControlRecord> {
        if !role.allows(Capability::ControlParticipants) {
            return Err(AppError::forbidden(format!(
                "Role {role} may not control participants"
            )));
        }

        let session = self
            .roster
            .find_session(meeting_id)
            .await?
            .ok_or_else(|| AppError::not_found("No such live session"))?;
        if session.is_terminal() {
            return Err(AppError::inactive(format!(
                "Live session is {}",
                session.status
            )));
        }
        if actor_id != session.presenter_id {
            return Err(AppError::forbidden(
                "Presenter identity does not match this session",
            ));
        }
        if target == session.presenter_id.to_string() {
            return Err(AppError::forbidden("The presenter cannot be targeted"));
        }

        if action == ControlAction::Remove {
            self.leave(meeting_id, target).await?;
        }

        let record = self
            .roster
            .insert_control(meeting_id, actor_id, target, action)
            .await?;
        info!(
            meeting_id = %meeting_id,
            target,
            action = %action,
            "Control action issued"
        );
        Ok(record)
    }

    /// Fetches a live session by meeting id.
    pub async fn get(&self, meeting_id: Uuid) -> AppResult<LiveSession> {
        self.roster
            .find_session(meeting_id)
            .await?
            .ok_or_else(|| AppError::not_found("No such live session"))
    }

    /// Read-only device occupancy for capacity-aware UIs.
    pub async fn active_device_count(&self, credential_id: Uuid) -> AppResult<i64> {
        self.admission.active_device_count(credential_id).await
    }

    async fn authorize_terminal(
        &self,
        meeting_id: Uuid,
        actor_id: Uuid,
        role: ParticipantRole,
        capability: Capability,
    ) -> AppResult<LiveSession> {
        if !role.allows(capability) {
            return Err(AppError::forbidden(format!(
                "Role {role} may not terminate live sessions"
            )));
        }
        let session = self
            .roster
            .find_session(meeting_id)
            .await?
            .ok_or_else(|| AppError::not_found("No such live session"))?;
        if actor_id != session.presenter_id {
            return Err(AppError::forbidden(
                "Presenter identity does not match this session",
            ));
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::MemoryRosterStore;
    use chrono::Duration;
    use classcast_admission::registry::MemorySessionRegistry;
    use classcast_admission::LogNotifier;
    use classcast_core::config::admission::AdmissionConfig;
    use classcast_core::error::ErrorKind;
    use classcast_entity::credential::Credential;

    struct Rig {
        service: LiveSessionService,
        credential_id: Uuid,
        presenter_id: Uuid,
    }

    async fn rig(capacity: i32) -> Rig {
        let registry = Arc::new(MemorySessionRegistry::new());
        let now = Utc::now();
        let credential = Credential {
            id: Uuid::new_v4(),
            name: "room-202".to_string(),
            capacity,
            active: true,
            expires_at: None,
            last_used_at: None,
            active_device_count: 0,
            created_at: now,
            updated_at: now,
        };
        let credential_id = credential.id;
        registry.put_credential(credential).await;

        let admission = Arc::new(AdmissionController::new(
            Arc::clone(&registry) as Arc<dyn SessionRegistry>,
            Arc::new(LogNotifier),
            AdmissionConfig::default(),
        ));
        let service = LiveSessionService::new(
            Arc::new(MemoryRosterStore::new()),
            Arc::clone(&registry) as Arc<dyn SessionRegistry>,
            admission,
            LiveConfig::default(),
        );
        Rig {
            service,
            credential_id,
            presenter_id: Uuid::new_v4(),
        }
    }

    fn start_cmd(rig: &Rig) -> StartLiveSession {
        StartLiveSession {
            credential_id: rig.credential_id,
            presenter_id: rig.presenter_id,
            title: "Algebra II".to_string(),
            scheduled_start: None,
            settings: None,
        }
    }

    fn attendee(n: usize) -> JoinRequest {
        JoinRequest {
            role: ParticipantRole::Attendee,
            identity: JoinIdentity::Device {
                identity_key: IdentityKey::new(format!("dev:student-{n}")),
                session_token: format!("tok-{n}"),
            },
            display_name: format!("Student {n}"),
        }
    }

    fn presenter_join(rig: &Rig) -> JoinRequest {
        JoinRequest {
            role: ParticipantRole::Presenter,
            identity: JoinIdentity::Presenter {
                presenter_id: rig.presenter_id,
            },
            display_name: "Teacher".to_string(),
        }
    }

    #[tokio::test]
    async fn test_start_computes_participant_ceiling_from_capacity() {
        let rig = rig(3).await;
        let session = rig
            .service
            .start(ParticipantRole::Presenter, start_cmd(&rig))
            .await
            .unwrap();
        assert_eq!(session.status, LiveStatus::Scheduled);
        assert_eq!(session.max_participants, 6);
    }

    #[tokio::test]
    async fn test_start_conflict_carries_existing_meeting_id() {
        let rig = rig(3).await;
        let first = rig
            .service
            .start(ParticipantRole::Presenter, start_cmd(&rig))
            .await
            .unwrap();

        let err = rig
            .service
            .start(ParticipantRole::Presenter, start_cmd(&rig))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(err.conflicting_id, Some(first.id));
    }

    #[tokio::test]
    async fn test_start_requires_the_capability() {
        let rig = rig(3).await;
        for role in [ParticipantRole::Attendee, ParticipantRole::Manager] {
            let err = rig.service.start(role, start_cmd(&rig)).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::Forbidden);
        }
    }

    #[tokio::test]
    async fn test_first_join_drives_session_live() {
        let rig = rig(3).await;
        let session = rig
            .service
            .start(ParticipantRole::Presenter, start_cmd(&rig))
            .await
            .unwrap();
        assert_eq!(session.status, LiveStatus::Scheduled);

        rig.service
            .join(session.id, presenter_join(&rig))
            .await
            .unwrap();

        let session = rig.service.get(session.id).await.unwrap();
        assert_eq!(session.status, LiveStatus::Live);
        assert!(session.started_at.is_some());

        // Leaving with an unknown key is a no-op, not an error.
        assert!(!rig.service.leave(session.id, "no-such-key").await.unwrap());
    }

    #[tokio::test]
    async fn test_presenter_join_with_wrong_identity_is_forbidden() {
        let rig = rig(3).await;
        let session = rig
            .service
            .start(ParticipantRole::Presenter, start_cmd(&rig))
            .await
            .unwrap();

        let request = JoinRequest {
            role: ParticipantRole::Presenter,
            identity: JoinIdentity::Presenter {
                presenter_id: Uuid::new_v4(),
            },
            display_name: "Impostor".to_string(),
        };
        let err = rig.service.join(session.id, request).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_session_fills_and_reverts_when_someone_leaves() {
        let rig = rig(3).await;
        let session = rig
            .service
            .start(ParticipantRole::Presenter, start_cmd(&rig))
            .await
            .unwrap();

        // Ceiling is capacity 3 x headroom 2 = 6.
        for n in 0..6 {
            rig.service.join(session.id, attendee(n)).await.unwrap();
        }
        // Devices were evicted down to capacity, but evicted devices'
        // roster records stay open until they leave.
        assert_eq!(
            rig.service
                .active_device_count(rig.credential_id)
                .await
                .unwrap(),
            3
        );
        let session_now = rig.service.get(session.id).await.unwrap();
        assert_eq!(session_now.status, LiveStatus::Full);
        assert_eq!(session_now.participant_count, 6);

        let err = rig
            .service
            .join(session.id, attendee(6))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CapacityExceeded);

        rig.service.leave(session.id, "dev:student-2").await.unwrap();
        assert_eq!(
            rig.service.get(session.id).await.unwrap().status,
            LiveStatus::Live
        );
        rig.service.join(session.id, attendee(6)).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejoin_with_open_record_is_idempotent() {
        let rig = rig(3).await;
        let session = rig
            .service
            .start(ParticipantRole::Presenter, start_cmd(&rig))
            .await
            .unwrap();

        let first = rig.service.join(session.id, attendee(1)).await.unwrap();
        let again = rig.service.join(session.id, attendee(1)).await.unwrap();
        assert_eq!(first.id, again.id);
    }

    #[tokio::test]
    async fn test_join_rejected_on_terminal_session() {
        let rig = rig(3).await;
        let session = rig
            .service
            .start(ParticipantRole::Presenter, start_cmd(&rig))
            .await
            .unwrap();
        rig.service
            .cancel(session.id, rig.presenter_id, ParticipantRole::Presenter)
            .await
            .unwrap();

        let err = rig.service.join(session.id, attendee(1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Inactive);
    }

    #[tokio::test]
    async fn test_end_closes_roster_and_computes_duration() {
        let rig = rig(3).await;
        let session = rig
            .service
            .start(ParticipantRole::Presenter, start_cmd(&rig))
            .await
            .unwrap();
        rig.service
            .join(session.id, presenter_join(&rig))
            .await
            .unwrap();
        rig.service.join(session.id, attendee(1)).await.unwrap();

        let ended = rig
            .service
            .end(session.id, rig.presenter_id, ParticipantRole::Presenter)
            .await
            .unwrap();
        assert_eq!(ended.status, LiveStatus::Ended);
        assert!(ended.ended_at.is_some());
        assert!(ended.duration_seconds.unwrap() >= 0);
        assert_eq!(ended.participant_count, 0);

        // Ending twice is an error, not a silent no-op.
        let err = rig
            .service
            .end(session.id, rig.presenter_id, ParticipantRole::Presenter)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Inactive);
    }

    #[tokio::test]
    async fn test_end_forbidden_for_everyone_but_the_owning_presenter() {
        let rig = rig(3).await;
        let session = rig
            .service
            .start(ParticipantRole::Presenter, start_cmd(&rig))
            .await
            .unwrap();

        for role in [ParticipantRole::Attendee, ParticipantRole::Manager] {
            let err = rig
                .service
                .end(session.id, Uuid::new_v4(), role)
                .await
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::Forbidden);
        }

        // A manager claiming the owner's id still lacks the capability.
        let err = rig
            .service
            .end(session.id, rig.presenter_id, ParticipantRole::Manager)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);

        let err = rig
            .service
            .end(session.id, Uuid::new_v4(), ParticipantRole::Presenter)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);

        let ended = rig
            .service
            .end(session.id, rig.presenter_id, ParticipantRole::Presenter)
            .await
            .unwrap();
        assert_eq!(ended.status, LiveStatus::Ended);
    }

    #[tokio::test]
    async fn test_cancel_before_start_has_zero_duration() {
        let rig = rig(3).await;
        let session = rig
            .service
            .start(ParticipantRole::Presenter, start_cmd(&rig))
            .await
            .unwrap();

        let cancelled = rig
            .service
            .cancel(session.id, rig.presenter_id, ParticipantRole::Presenter)
            .await
            .unwrap();
        assert_eq!(cancelled.status, LiveStatus::Cancelled);
        assert_eq!(cancelled.duration_seconds, Some(0));
        assert!(cancelled.started_at.is_none());
    }

    #[tokio::test]
    async fn test_control_requires_capability_and_never_targets_presenter() {
        let rig = rig(3).await;
        let session = rig
            .service
            .start(ParticipantRole::Presenter, start_cmd(&rig))
            .await
            .unwrap();
        rig.service.join(session.id, attendee(1)).await.unwrap();

        for role in [ParticipantRole::Attendee, ParticipantRole::Manager] {
            let err = rig
                .service
                .control(
                    session.id,
                    Uuid::new_v4(),
                    role,
                    "dev:student-1",
                    ControlAction::Mute,
                )
                .await
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::Forbidden);
        }

        let err = rig
            .service
            .control(
                session.id,
                rig.presenter_id,
                ParticipantRole::Presenter,
                &rig.presenter_id.to_string(),
                ControlAction::Mute,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_remove_control_performs_leave_bookkeeping() {
        let rig = rig(3).await;
        let session = rig
            .service
            .start(ParticipantRole::Presenter, start_cmd(&rig))
            .await
            .unwrap();
        rig.service.join(session.id, attendee(1)).await.unwrap();

        let record = rig
            .service
            .control(
                session.id,
                rig.presenter_id,
                ParticipantRole::Presenter,
                "dev:student-1",
                ControlAction::Remove,
            )
            .await
            .unwrap();
        assert_eq!(record.action, ControlAction::Remove);

        // The target's roster record is closed; rejoining creates a new one.
        let rejoined = rig.service.join(session.id, attendee(1)).await.unwrap();
        assert!(rejoined.is_present());
    }

    #[tokio::test]
    async fn test_control_log_preserves_issue_order() {
        let rig = rig(3).await;
        let session = rig
            .service
            .start(ParticipantRole::Presenter, start_cmd(&rig))
            .await
            .unwrap();
        rig.service.join(session.id, attendee(1)).await.unwrap();

        for action in [
            ControlAction::Mute,
            ControlAction::VideoOff,
            ControlAction::Unmute,
        ] {
            rig.service
                .control(
                    session.id,
                    rig.presenter_id,
                    ParticipantRole::Presenter,
                    "dev:student-1",
                    action,
                )
                .await
                .unwrap();
        }

        let log = rig
            .service
            .roster
            .list_controls(session.id)
            .await
            .unwrap();
        let actions: Vec<ControlAction> = log.iter().map(|c| c.action).collect();
        assert_eq!(
            actions,
            vec![
                ControlAction::Mute,
                ControlAction::VideoOff,
                ControlAction::Unmute
            ]
        );
    }

    #[tokio::test]
    async fn test_expired_credential_blocks_start() {
        let rig = rig(3).await;
        // Deactivate by replacing the credential with an expired copy.
        let registry = MemorySessionRegistry::new();
        let now = Utc::now();
        let credential = Credential {
            id: rig.credential_id,
            name: "room-202".to_string(),
            capacity: 3,
            active: true,
            expires_at: Some(now - Duration::hours(1)),
            last_used_at: None,
            active_device_count: 0,
            created_at: now,
            updated_at: now,
        };
        registry.put_credential(credential).await;
        let registry = Arc::new(registry);
        let admission = Arc::new(AdmissionController::new(
            Arc::clone(&registry) as Arc<dyn SessionRegistry>,
            Arc::new(LogNotifier),
            AdmissionConfig::default(),
        ));
        let service = LiveSessionService::new(
            Arc::new(MemoryRosterStore::new()),
            Arc::clone(&registry) as Arc<dyn SessionRegistry>,
            admission,
            LiveConfig::default(),
        );

        let err = service
            .start(ParticipantRole::Presenter, start_cmd(&rig))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Inactive);
    }
}
