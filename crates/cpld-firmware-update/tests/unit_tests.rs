//! Unit tests for the public API of the version manager

mod config_tests {
    use cpld_firmware_update::prelude::*;
    use std::fs;

    #[test]
    fn test_config_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cpld.json");
        fs::write(
            &path,
            r#"{ "media_dir": "/run/media", "max_active_versions": 3 }"#,
        )?;

        let config = UpdaterConfig::from_file(&path)?;

        assert_eq!(config.max_active_versions, 3);
        assert_eq!(config.image_dir("0badc0de").to_string_lossy(), "/run/media/cpld-0badc0de");
        assert_eq!(config.image_prefix, "cpld-");
        Ok(())
    }

    #[test]
    fn test_config_from_file_rejects_invalid_values() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cpld.json");
        fs::write(&path, r#"{ "max_active_versions": 0 }"#)?;

        assert!(matches!(
            UpdaterConfig::from_file(&path),
            Err(UpdaterError::InvalidConfiguration(_))
        ));

        fs::write(&path, "{ not json")?;
        assert!(matches!(
            UpdaterConfig::from_file(&path),
            Err(UpdaterError::Json(_))
        ));
        Ok(())
    }

    #[test]
    fn test_custom_flash_unit_template() -> UpdaterResult<()> {
        let config = UpdaterConfig::builder()
            .flash_unit_template("cpld-flash@{}.service")
            .build()?;
        assert_eq!(config.flash_unit("2a1022fe"), "cpld-flash@2a1022fe.service");
        Ok(())
    }
}

mod version_tests {
    use cpld_firmware_update::prelude::*;
    use std::fs;

    #[test]
    fn test_purpose_display_is_fully_qualified() {
        assert_eq!(
            VersionPurpose::Cpld.to_string(),
            "xyz.openbmc_project.Software.Version.VersionPurpose.CPLD"
        );
        assert_eq!(
            VersionPurpose::parse(&VersionPurpose::Bios.to_string()),
            VersionPurpose::Bios
        );
    }

    #[test]
    fn test_cpld_version_from_release_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cpld-release");
        fs::write(&path, "NAME=\"cpld\"\nVERSION_ID=\"0x12-rev3\"\n")?;

        assert_eq!(cpld_version(&path)?, "0x12-rev3");
        Ok(())
    }
}

mod association_tests {
    use cpld_firmware_update::association::{
        ACTIVE_FWD_ASSOCIATION, FUNCTIONAL_FWD_ASSOCIATION, UPDATEABLE_FWD_ASSOCIATION,
    };
    use cpld_firmware_update::prelude::*;

    #[test]
    fn test_association_triples() {
        let path = "/xyz/openbmc_project/software/2a1022fe";
        assert_eq!(Association::active(path).forward, ACTIVE_FWD_ASSOCIATION);
        assert_eq!(Association::updateable(path).forward, UPDATEABLE_FWD_ASSOCIATION);
        assert_eq!(Association::functional(path).forward, FUNCTIONAL_FWD_ASSOCIATION);
        assert_eq!(Association::functional(path).reverse, "software_version");
    }

    #[test]
    fn test_association_list_iteration() {
        let mut list = AssociationList::new();
        list.push(Association::active("/a"));
        list.push(Association::updateable("/a"));
        list.push(Association::active("/b"));

        let paths: Vec<&str> = (&list).into_iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, ["/a", "/a", "/b"]);
        assert_eq!(list.count_forward(ACTIVE_FWD_ASSOCIATION), 2);
        assert!(list.remove_path("/a"));
        assert_eq!(list.len(), 1);
    }
}
