//! Pure model tests: lifecycle rules, scope, pagination, statistics.

use chrono::Utc;
use secrecy::SecretString;
use serde_json::json;
use webbuddy_rs::error::Error;
use webbuddy_rs::model::ledger::{UsageBucket, UsageGroup, UsageStats};
use webbuddy_rs::model::project::{Project, ProjectId, ProjectTokens, ProjectUpdate};
use webbuddy_rs::model::query::{Completion, NewQuery, Status};
use webbuddy_rs::model::user::{PasswordChange, Role, User, UserId};
use webbuddy_rs::model::{Page, PageRequest};
use webbuddy_rs::scope::Scope;

fn user(role: Role, project: Option<i64>) -> User {
    User {
        id: UserId(1),
        username: "alice".to_string(),
        fio_name: String::new(),
        email: "alice@example.com".to_string(),
        role,
        is_superuser: false,
        is_active: true,
        first_login: false,
        project: project.map(ProjectId),
        project_name: None,
        date_joined: Utc::now(),
        last_login: None,
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[test]
fn lifecycle_edges() {
    use Status::*;
    assert!(Queued.can_transition_to(InProgress));
    assert!(InProgress.can_transition_to(Done));
    assert!(InProgress.can_transition_to(Failed));

    assert!(!Queued.can_transition_to(Done));
    assert!(!InProgress.can_transition_to(Queued));
    for terminal in [Done, Failed] {
        for to in Status::ALL {
            assert!(
                !terminal.can_transition_to(to),
                "{terminal} must not move to {to}"
            );
        }
    }
}

#[test]
fn terminal_statuses() {
    assert!(Status::Done.is_terminal());
    assert!(Status::Failed.is_terminal());
    assert!(!Status::Queued.is_terminal());
    assert!(!Status::InProgress.is_terminal());
}

#[test]
fn status_wire_names() {
    assert_eq!(serde_json::to_value(Status::InProgress).unwrap(), json!("in_progress"));
    assert_eq!("in_progress".parse::<Status>().unwrap(), Status::InProgress);
    assert!(matches!(
        "running".parse::<Status>(),
        Err(Error::Validation(_))
    ));
}

#[test]
fn completion_requires_terminal_status() {
    let ok = Completion {
        status: Status::Done,
        answer_text: "42".to_string(),
    };
    assert!(ok.validate().is_ok());

    let not_terminal = Completion {
        status: Status::InProgress,
        answer_text: String::new(),
    };
    assert!(matches!(not_terminal.validate(), Err(Error::Validation(_))));
}

#[test]
fn blank_query_text_is_rejected() {
    let new = NewQuery {
        project: ProjectId(1),
        query_text: "   ".to_string(),
    };
    assert!(new.validate().is_err());
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

#[test]
fn scope_follows_role_and_project() {
    assert_eq!(
        Scope::for_user(&user(Role::Standard, Some(7))),
        Scope::Own(ProjectId(7))
    );
    assert_eq!(Scope::for_user(&user(Role::Standard, None)), Scope::Unassigned);
    assert_eq!(Scope::for_user(&user(Role::Admin, Some(7))), Scope::All);
    assert_eq!(Scope::for_user(&user(Role::Service, None)), Scope::All);

    let mut superuser = user(Role::Standard, Some(7));
    superuser.is_superuser = true;
    assert_eq!(Scope::for_user(&superuser), Scope::All);
}

#[test]
fn scope_visibility() {
    let own = Scope::Own(ProjectId(7));
    assert!(own.permits(ProjectId(7)));
    assert!(!own.permits(ProjectId(8)));
    assert!(Scope::All.permits(ProjectId(8)));
    assert!(!Scope::Unassigned.permits(ProjectId(7)));
}

#[test]
fn scope_write_checks() {
    let own = Scope::Own(ProjectId(7));
    assert!(own.authorize_write(ProjectId(7), "query").is_ok());
    assert!(matches!(
        own.authorize_write(ProjectId(8), "query"),
        Err(Error::Forbidden(_))
    ));
    assert!(matches!(
        Scope::Unassigned.authorize_write(ProjectId(7), "query"),
        Err(Error::Forbidden(_))
    ));
    assert!(Scope::All.authorize_write(ProjectId(8), "query").is_ok());
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[test]
fn page_request_clamps() {
    let request = PageRequest::new(Some(0), Some(10_000));
    assert_eq!(request.page, 1);
    assert_eq!(request.page_size, webbuddy_rs::model::MAX_PAGE_SIZE);

    let request = PageRequest::new(Some(3), Some(10));
    assert_eq!(request.limit(), 10);
    assert_eq!(request.offset(), 20);
}

#[test]
fn page_links() {
    let first: Page<i32> = Page::new(PageRequest::new(Some(1), Some(2)), 5, vec![1, 2]);
    assert_eq!(first.previous, None);
    assert_eq!(first.next, Some(2));

    let last: Page<i32> = Page::new(PageRequest::new(Some(3), Some(2)), 5, vec![5]);
    assert_eq!(last.previous, Some(2));
    assert_eq!(last.next, None);

    let json = serde_json::to_value(&last).unwrap();
    assert_eq!(json["count"], json!(5));
    assert_eq!(json["results"], json!([5]));
}

// ---------------------------------------------------------------------------
// Accounts and projects
// ---------------------------------------------------------------------------

#[test]
fn password_change_rules() {
    let change = |new: &str, confirm: &str| PasswordChange {
        old_password: "old-password".to_string(),
        new_password: new.to_string(),
        confirm_password: confirm.to_string(),
    };
    assert!(change("correct horse", "correct horse").validate().is_ok());
    assert!(change("correct horse", "correct house").validate().is_err());
    assert!(change("short", "short").validate().is_err());
}

#[test]
fn project_update_validates_name() {
    let update = ProjectUpdate {
        project_name: Some(String::new()),
        ..Default::default()
    };
    assert!(update.validate().is_err());
    assert!(ProjectUpdate::default().validate().is_ok());
}

#[test]
fn project_update_caps_integration_fields_at_128_chars() {
    let too_long = ProjectUpdate {
        jira_token: Some("x".repeat(200)),
        ..Default::default()
    };
    let err = too_long.validate().unwrap_err();
    assert!(matches!(err, Error::Validation(ref m) if m.contains("jira_token")));

    let at_limit = ProjectUpdate {
        test_it_token: Some("t".repeat(128)),
        test_it_project_id: Some(String::new()),
        jira_project_id: Some("J-1".to_string()),
        ..Default::default()
    };
    assert!(at_limit.validate().is_ok());

    let long_id = ProjectUpdate {
        test_it_project_id: Some("é".repeat(129)),
        ..Default::default()
    };
    assert!(long_id.validate().is_err());
}

#[test]
fn project_read_view_has_no_secrets_but_token_view_does() {
    let project = Project {
        id: ProjectId(1),
        project_name: "alpha".to_string(),
        test_it_project_id: "T-1".to_string(),
        jira_project_id: "J-1".to_string(),
        project_context: String::new(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let public = serde_json::to_value(&project).unwrap();
    assert!(public.get("jira_token").is_none());

    let tokens = ProjectTokens {
        project,
        test_it_token: SecretString::from("ti-secret".to_string()),
        jira_token: SecretString::from("jira-secret".to_string()),
    };
    let exposed = serde_json::to_value(&tokens).unwrap();
    assert_eq!(exposed["jira_token"], json!("jira-secret"));
    assert_eq!(exposed["project_name"], json!("alpha"));
    assert!(!format!("{tokens:?}").contains("jira-secret"));
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[test]
fn usage_stats_from_groups() {
    let agents = vec![
        UsageGroup {
            key: "A".to_string(),
            total: 100,
            count: 1,
        },
        UsageGroup {
            key: "B".to_string(),
            total: 50,
            count: 1,
        },
    ];
    let models = vec![UsageGroup {
        key: "gpt".to_string(),
        total: 150,
        count: 2,
    }];

    let stats = UsageStats::from_groups(agents, models);
    assert_eq!(stats.total_tokens, 150);
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.by_agent["A"], UsageBucket { total: 100, count: 1 });
    assert_eq!(stats.by_agent["B"], UsageBucket { total: 50, count: 1 });
    assert_eq!(stats.by_model["gpt"], UsageBucket { total: 150, count: 2 });
}

#[test]
fn usage_stats_of_nothing_is_zero() {
    let stats = UsageStats::from_groups(Vec::new(), Vec::new());
    assert_eq!(stats, UsageStats::default());
}
