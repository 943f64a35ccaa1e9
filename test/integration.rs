// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{reconcile, settings, snapshot, RepoFixture};

use anyhow::Result;
use cfgsync::{
    import::ImportError, reconcile::ReconcileError, Importer, Mode, Outcome, Verdict,
};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    env::current_dir,
    fs::{create_dir_all, metadata, read_to_string, set_permissions, write, Permissions},
    os::unix::fs::PermissionsExt,
    path::PathBuf,
};

fn verdicts(outcome: &Outcome) -> Vec<(PathBuf, Verdict)> {
    outcome
        .entries
        .iter()
        .map(|classified| (classified.entry.relative_path().to_path_buf(), classified.verdict))
        .collect()
}

#[sealed_test]
fn install_missing_file() -> Result<()> {
    let root = current_dir()?;
    let target = root.join("home");
    create_dir_all(&target)?;
    let fixture = RepoFixture::new(root.join("repo"))?;
    fixture.stage_and_commit("src/.config/app.conf", "key = 1\n")?;

    let repo = fixture.open()?;
    let settings = settings(&target);
    let (outcome, report) = reconcile(&repo, &settings, Mode::Install)?;

    assert_eq!(
        verdicts(&outcome),
        vec![
            (PathBuf::from(".config"), Verdict::Missing),
            (PathBuf::from(".config/app.conf"), Verdict::Missing),
        ]
    );
    assert_eq!(read_to_string(target.join(".config/app.conf"))?, "key = 1\n");
    assert!(report.starts_with("installing...\n"));
    assert!(report.contains("file missing"));
    assert!(!target.join(".config/app.conf.old").exists());

    Ok(())
}

#[sealed_test]
fn second_install_finds_everything_identical() -> Result<()> {
    let root = current_dir()?;
    let target = root.join("home");
    create_dir_all(&target)?;
    let fixture = RepoFixture::new(root.join("repo"))?;
    fixture.stage_and_commit("src/.bashrc", "alias ll='ls -l'\n")?;
    fixture.stage_and_commit("src/.vim/vimrc", "set number\n")?;

    let repo = fixture.open()?;
    let settings = settings(&target);
    reconcile(&repo, &settings, Mode::Install)?;
    let before = snapshot(&target)?;
    let (outcome, _) = reconcile(&repo, &settings, Mode::Install)?;

    assert!(outcome
        .entries
        .iter()
        .all(|classified| classified.verdict == Verdict::Identical));
    assert!(outcome.attribute_changes.is_empty());
    assert_eq!(snapshot(&target)?, before);

    Ok(())
}

#[sealed_test]
fn dry_run_leaves_target_untouched() -> Result<()> {
    let root = current_dir()?;
    let target = root.join("home");
    create_dir_all(target.join(".vim"))?;
    write(target.join(".vim/vimrc"), "set ruler\n")?;
    let fixture = RepoFixture::new(root.join("repo"))?;
    fixture.stage_and_commit("src/.vim/vimrc", "set number\n")?;
    fixture.stage_and_commit("src/.bashrc", "export EDITOR=vim\n")?;

    let repo = fixture.open()?;
    let settings = settings(&target);
    let before = snapshot(&target)?;
    let (outcome, report) = reconcile(&repo, &settings, Mode::DryRun)?;

    assert_eq!(snapshot(&target)?, before);
    assert_eq!(
        verdicts(&outcome),
        vec![
            (PathBuf::from(".bashrc"), Verdict::Missing),
            (PathBuf::from(".vim"), Verdict::Identical),
            (PathBuf::from(".vim/vimrc"), Verdict::SizeDiffers),
        ]
    );
    assert!(report.starts_with("checking content...\n"));
    assert!(report.contains("file size differs"));
    assert!(report.contains("-set ruler\n"));
    assert!(report.contains("+set number\n"));

    Ok(())
}

#[sealed_test]
fn install_backs_up_differing_file() -> Result<()> {
    let root = current_dir()?;
    let target = root.join("home");
    create_dir_all(&target)?;
    write(target.join(".gitconfig"), "name = Jane\n")?;
    let fixture = RepoFixture::new(root.join("repo"))?;
    fixture.stage_and_commit("src/.gitconfig", "name = John\n")?;

    let repo = fixture.open()?;
    let settings = settings(&target);
    let (outcome, report) = reconcile(&repo, &settings, Mode::Install)?;

    assert_eq!(
        verdicts(&outcome),
        vec![(PathBuf::from(".gitconfig"), Verdict::ContentDiffers)]
    );
    assert!(report.contains("file content differs"));
    assert_eq!(read_to_string(target.join(".gitconfig"))?, "name = John\n");
    assert_eq!(read_to_string(target.join(".gitconfig.old"))?, "name = Jane\n");

    Ok(())
}

#[sealed_test]
fn dirty_tree_is_refused() -> Result<()> {
    let root = current_dir()?;
    let target = root.join("home");
    create_dir_all(&target)?;
    let fixture = RepoFixture::new(root.join("repo"))?;
    fixture.stage_and_commit("src/.profile", "umask 022\n")?;
    fixture.write("src/.profile", "umask 0077\n")?;

    let repo = fixture.open()?;
    let settings = settings(&target);
    let result = reconcile(&repo, &settings, Mode::Install);

    let error = result.err().map(|error| error.downcast::<ReconcileError>());
    assert!(matches!(error, Some(Ok(ReconcileError::Dirty { .. }))));
    assert!(!target.join(".profile").exists());

    Ok(())
}

#[sealed_test]
fn template_installs_under_expanded_name() -> Result<()> {
    let root = current_dir()?;
    let target = root.join("home");
    create_dir_all(&target)?;
    let fixture = RepoFixture::new(root.join("repo"))?;
    fixture.stage_and_commit("src/cfg.hostrc", "host = =cfg[HOST]\nuser = =cfg[USER]\n")?;

    let repo = fixture.open()?;
    let mut settings = settings(&target);
    settings.params.insert("HOST".into(), "box".into());
    let (outcome, _) = reconcile(&repo, &settings, Mode::Install)?;

    assert_eq!(
        verdicts(&outcome),
        vec![(PathBuf::from("hostrc"), Verdict::Missing)]
    );
    assert_eq!(
        read_to_string(target.join("hostrc"))?,
        "host = box\nuser = =cfg[USER]\n"
    );
    assert!(!target.join("cfg.hostrc").exists());

    let (outcome, _) = reconcile(&repo, &settings, Mode::Install)?;
    assert_eq!(
        verdicts(&outcome),
        vec![(PathBuf::from("hostrc"), Verdict::Identical)]
    );

    Ok(())
}

#[sealed_test]
fn import_commits_file_and_mirrors_ancestors() -> Result<()> {
    let root = current_dir()?;
    let target = root.join("system");
    create_dir_all(target.join("etc/ssh"))?;
    write(target.join("etc/ssh/sshd_config"), "PermitRootLogin no\n")?;
    set_permissions(target.join("etc/ssh/sshd_config"), Permissions::from_mode(0o600))?;
    set_permissions(target.join("etc/ssh"), Permissions::from_mode(0o700))?;
    let fixture = RepoFixture::new(root.join("repo"))?;
    fixture.stage_and_commit("README", "dotfiles\n")?;

    let repo = fixture.open()?;
    let settings = settings(&target);
    let staged = Importer::new(&repo, &settings).import(target.join("etc/ssh/sshd_config"))?;

    let tracked = fixture.workdir().join("src/etc/ssh/sshd_config");
    assert_eq!(staged, PathBuf::from("src/etc/ssh/sshd_config"));
    assert_eq!(read_to_string(&tracked)?, "PermitRootLogin no\n");
    assert_eq!(fixture.head_message()?, "[cfg] : +sshd_config");
    assert_eq!(metadata(&tracked)?.permissions().mode() & 0o7777, 0o600);
    assert_eq!(
        metadata(fixture.workdir().join("src/etc/ssh"))?.permissions().mode() & 0o7777,
        0o700
    );

    let (outcome, _) = reconcile(&repo, &settings, Mode::DryRun)?;
    assert!(outcome
        .entries
        .iter()
        .all(|classified| classified.verdict == Verdict::Identical));
    assert!(outcome.attribute_changes.is_empty());

    Ok(())
}

#[sealed_test]
fn import_outside_target_changes_nothing() -> Result<()> {
    let root = current_dir()?;
    let target = root.join("home");
    create_dir_all(&target)?;
    write(root.join("stray.conf"), "stray\n")?;
    let fixture = RepoFixture::new(root.join("repo"))?;
    fixture.stage_and_commit("README", "dotfiles\n")?;

    let repo = fixture.open()?;
    let settings = settings(&target);
    let result = Importer::new(&repo, &settings).import(root.join("stray.conf"));

    assert!(matches!(result, Err(ImportError::OutsideTarget { .. })));
    assert!(!fixture.workdir().join("src").exists());
    assert_eq!(fixture.head_message()?, "chore: add \"README\"");

    Ok(())
}

#[sealed_test]
fn import_rejects_missing_file() -> Result<()> {
    let root = current_dir()?;
    let target = root.join("home");
    create_dir_all(&target)?;
    let fixture = RepoFixture::new(root.join("repo"))?;
    fixture.stage_and_commit("README", "dotfiles\n")?;

    let repo = fixture.open()?;
    let settings = settings(&target);
    let result = Importer::new(&repo, &settings).import(target.join(".nope"));

    assert!(matches!(result, Err(ImportError::Missing { .. })));

    Ok(())
}

#[sealed_test]
fn attribute_drift_reported_then_fixed() -> Result<()> {
    let root = current_dir()?;
    let target = root.join("home");
    create_dir_all(&target)?;
    write(target.join(".netrc"), "machine example.com\n")?;
    set_permissions(target.join(".netrc"), Permissions::from_mode(0o644))?;
    let fixture = RepoFixture::new(root.join("repo"))?;
    fixture.stage_and_commit("src/.netrc", "machine example.com\n")?;
    set_permissions(
        fixture.workdir().join("src/.netrc"),
        Permissions::from_mode(0o600),
    )?;

    let repo = fixture.open()?;
    let settings = settings(&target);
    let (outcome, report) = reconcile(&repo, &settings, Mode::DryRun)?;

    assert_eq!(
        verdicts(&outcome),
        vec![(PathBuf::from(".netrc"), Verdict::Identical)]
    );
    assert_eq!(outcome.attribute_changes.len(), 1);
    assert_eq!(outcome.attribute_changes[0].descriptor, ".f...p.....");
    assert!(report.contains(".f...p..... -rw------- -rw-r--r-- .netrc\n"));
    assert_eq!(metadata(target.join(".netrc"))?.permissions().mode() & 0o7777, 0o644);

    let (outcome, _) = reconcile(&repo, &settings, Mode::Install)?;
    assert_eq!(outcome.attribute_changes.len(), 1);
    assert_eq!(metadata(target.join(".netrc"))?.permissions().mode() & 0o7777, 0o600);
    assert!(!target.join(".netrc.old").exists());

    let (outcome, _) = reconcile(&repo, &settings, Mode::DryRun)?;
    assert!(outcome.attribute_changes.is_empty());

    Ok(())
}
