use std::fmt::Write;

use super::record::{Compression, ServerRecord};

/// Renders one Barman server section.
///
/// Keys appear in a fixed order: `description`, `conninfo`, `ssh_command`,
/// `compression`, then the backup scripts when set. `custom_lines` is
/// appended as-is after the keys. The output always ends with a newline.
///
/// `Compression::None` omits the `compression` key, which leaves Barman at
/// its uncompressed default.
pub fn render(record: &ServerRecord) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "[{}]", record.identifier);
    let _ = writeln!(out, "description = {}", record.description);
    let _ = writeln!(out, "conninfo = {}", record.conninfo);
    let _ = writeln!(out, "ssh_command = {}", record.ssh_command);
    if record.compression != Compression::None {
        let _ = writeln!(out, "compression = {}", record.compression);
    }
    if let Some(script) = &record.pre_backup_script {
        let _ = writeln!(out, "pre_backup_script = {}", script);
    }
    if let Some(script) = &record.post_backup_script {
        let _ = writeln!(out, "post_backup_script = {}", script);
    }
    if let Some(lines) = &record.custom_lines {
        out.push_str(lines);
        if !lines.ends_with('\n') {
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::record::ServerDeclaration;

    fn declaration() -> ServerDeclaration {
        ServerDeclaration {
            conninfo: Some("user=user1 host=server1 db=db1 pass=pass1 port=5432".to_string()),
            ssh_command: Some("ssh postgres@server1".to_string()),
            ..ServerDeclaration::new("server1")
        }
    }

    #[test]
    fn test_render_defaults() {
        let record = ServerRecord::new(&declaration(), None).unwrap();
        assert_eq!(
            render(&record),
            "[server1]\n\
             description = server1\n\
             conninfo = user=user1 host=server1 db=db1 pass=pass1 port=5432\n\
             ssh_command = ssh postgres@server1\n\
             compression = gzip\n"
        );
    }

    #[test]
    fn test_render_all_fields_in_order() {
        let decl = ServerDeclaration {
            description: Some("main cluster".to_string()),
            compression: Some("bzip2".to_string()),
            pre_backup_script: Some("/usr/local/bin/pre".to_string()),
            post_backup_script: Some("/usr/local/bin/post".to_string()),
            custom_lines: Some("thisisastring".to_string()),
            ..declaration()
        };
        let record = ServerRecord::new(&decl, None).unwrap();
        let rendered = render(&record);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines,
            vec![
                "[server1]",
                "description = main cluster",
                "conninfo = user=user1 host=server1 db=db1 pass=pass1 port=5432",
                "ssh_command = ssh postgres@server1",
                "compression = bzip2",
                "pre_backup_script = /usr/local/bin/pre",
                "post_backup_script = /usr/local/bin/post",
                "thisisastring",
            ]
        );
    }

    #[test]
    fn test_absent_scripts_are_omitted() {
        let record = ServerRecord::new(&declaration(), None).unwrap();
        assert!(!render(&record).contains("_backup_script"));
    }

    #[test]
    fn test_custom_lines_verbatim() {
        let custom = "streaming_archiver = on\nslot_name = barman\n  ; indented comment";
        let decl = ServerDeclaration {
            custom_lines: Some(custom.to_string()),
            ..declaration()
        };
        let rendered = render(&ServerRecord::new(&decl, None).unwrap());
        assert!(rendered.contains(custom));
        assert!(rendered.ends_with("; indented comment\n"));
    }

    #[test]
    fn test_compression_none_omits_key() {
        let decl = ServerDeclaration {
            compression: Some("none".to_string()),
            ..declaration()
        };
        let rendered = render(&ServerRecord::new(&decl, None).unwrap());
        assert!(!rendered.contains("compression"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let a = ServerRecord::new(&declaration(), None).unwrap();
        let b = ServerRecord::new(&declaration(), None).unwrap();
        assert_eq!(render(&a), render(&b));
    }
}
