use super::*;
use clap::CommandFactory;
use digisaathi::MarkerConfig;

fn signed_in_store(dir: &tempfile::TempDir) -> CliStore {
    let store = token_store(dir.path().join("token"), MarkerConfig::default());
    store.save("tok").unwrap();
    store
}

#[test]
fn command_tree_is_well_formed() {
    Cli::command().debug_assert();
}

#[test]
fn parses_nested_payment_command() {
    let cli = Cli::try_parse_from([
        "digisaathi", "--token-file", "/tmp/t", "payments", "send", "--to", "asha@okaxis", "--amount", "250",
    ])
    .unwrap();
    assert_eq!(cli.token_file, PathBuf::from("/tmp/t"));
    match cli.command {
        Command::Payments(PaymentsCommand { command: PaymentsSubcommand::Send { to, amount, note } }) => {
            assert_eq!(to, "asha@okaxis");
            assert!((amount - 250.0).abs() < f64::EPSILON);
            assert_eq!(note, None);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn explicit_base_url_is_validated() {
    assert!(matches!(resolve_config(Some("ftp://nope")), Err(CliError::Config(ConfigError::InvalidBaseUrl(_)))));
    assert_eq!(resolve_config(Some("http://localhost:8000/")).unwrap().base_url, "http://localhost:8000");
}

#[test]
fn rejected_token_is_cleared_and_reported_as_signed_out() {
    let dir = tempfile::tempdir().unwrap();
    let store = signed_in_store(&dir);
    let error = GatewayError::Api { status: 403, message: "Not authenticated".to_owned() };
    assert!(matches!(react(&store, error), CliError::SignedOut));
    assert_eq!(store.get(), None);
}

#[test]
fn server_error_keeps_token() {
    let dir = tempfile::tempdir().unwrap();
    let store = signed_in_store(&dir);
    let error = GatewayError::Api { status: 500, message: "boom".to_owned() };
    let reported = react(&store, error);
    assert_eq!(reported.to_string(), "boom");
    assert_eq!(store.get().as_deref(), Some("tok"));
}

#[test]
fn mime_types_follow_extension() {
    assert_eq!(mime_for(Path::new("bill.PNG")), Some("image/png"));
    assert_eq!(mime_for(Path::new("scan.jpeg")), Some("image/jpeg"));
    assert_eq!(mime_for(Path::new("id.pdf")), Some("application/pdf"));
    assert_eq!(mime_for(Path::new("notes.txt")), None);
    assert_eq!(mime_for(Path::new("README")), None);
}

#[test]
fn file_part_uses_name_and_type() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bill.jpg");
    std::fs::write(&path, [0xff, 0xd8]).unwrap();
    let part = read_file_part(&path).unwrap();
    assert_eq!(part.field, "file");
    assert_eq!(part.file_name, "bill.jpg");
    assert_eq!(part.mime_type.as_deref(), Some("image/jpeg"));
    assert_eq!(part.bytes, vec![0xff, 0xd8]);
}

#[test]
fn missing_file_names_path() {
    let error = read_file_part(Path::new("/definitely/not/here.png")).unwrap_err();
    assert!(error.to_string().contains("/definitely/not/here.png"));
}

#[test]
fn gate_labels() {
    let guard = RouteGuard::default();
    assert_eq!(gate_label(&guard.decide("/documents", false)), "redirect to /login");
    assert_eq!(gate_label(&guard.decide("/documents", true)), "allowed");
    assert_eq!(gate_label(&guard.decide("/payments", false)), "allowed");
}

#[test]
fn profile_flags_use_full_name() {
    let cli = Cli::try_parse_from(["digisaathi", "profile", "--full-name", "Asha Rao"]).unwrap();
    assert!(matches!(cli.command, Command::Profile { full_name: Some(ref name), email: None } if name == "Asha Rao"));
}

#[test]
fn amounts_must_be_positive() {
    assert!(positive_amount(10.0).is_ok());
    assert!(positive_amount(0.0).is_err());
    assert!(positive_amount(f64::NAN).is_err());
}

#[test]
fn literal_text_is_passed_through() {
    assert_eq!(text_or_stdin("Your KYC expires today").unwrap(), "Your KYC expires today");
}
