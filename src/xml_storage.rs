//! XML document storage (requires the persistence feature).
//!
//! The whole security data set lives in a single document:
//!
//! ```xml
//! <security>
//!     <user id="1" username="alice" password="..." email="alice@example.com" confirmed="1" active="1" super="0">
//!         <role>1</role>
//!         <preference key="theme">"dark"</preference>
//!     </user>
//!     <role id="1" name="editor" weight="5">
//!         <path>/articles/**</path>
//!         <permission>article.edit</permission>
//!     </role>
//!     <permission code="article.edit" description="Edit articles"/>
//!     <path>/admin/**</path>
//! </security>
//! ```
//!
//! Every save rewrites the full document.

use crate::{
    error::{Error, Result},
    permission::Permission,
    role::Role,
    storage::{
        IdSequence, PermissionMap, RoleMap, RoleRecord, SecurityData, SecurityStore, UserMap,
        UserRecord, resolve,
    },
    user::User,
};
use quick_xml::{
    Reader, Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

const TAG_ROOT: &str = "security";
const TAG_USER: &str = "user";
const TAG_ROLE: &str = "role";
const TAG_PERMISSION: &str = "permission";
const TAG_PREFERENCE: &str = "preference";
const TAG_PATH: &str = "path";

const ATTRIBUTE_ID: &str = "id";
const ATTRIBUTE_USERNAME: &str = "username";
const ATTRIBUTE_PASSWORD: &str = "password";
const ATTRIBUTE_NAME: &str = "name";
const ATTRIBUTE_EMAIL: &str = "email";
const ATTRIBUTE_IMAGE: &str = "image";
const ATTRIBUTE_CONFIRMED: &str = "confirmed";
const ATTRIBUTE_ACTIVE: &str = "active";
const ATTRIBUTE_SUPER: &str = "super";
const ATTRIBUTE_WEIGHT: &str = "weight";
const ATTRIBUTE_CODE: &str = "code";
const ATTRIBUTE_DESCRIPTION: &str = "description";
const ATTRIBUTE_KEY: &str = "key";

/// Configuration for the XML store.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct XmlStoreConfig {
    /// Location of the document.
    pub path: PathBuf,
    /// Spaces per nesting level in the written document.
    pub indent: usize,
    /// Whether to create missing parent directories on write.
    pub create_parent_dirs: bool,
}

impl XmlStoreConfig {
    /// Create a configuration for the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            indent: 4,
            create_parent_dirs: true,
        }
    }
}

/// Store keeping the security data in an XML document.
///
/// The document is read on first access to any collection; a missing document is an
/// empty data set.
#[derive(Debug)]
pub struct XmlStore {
    config: XmlStoreConfig,
    loaded: bool,
    data: SecurityData,
    ids: IdSequence,
}

impl XmlStore {
    /// Create a store for the document at `path` with default settings.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(XmlStoreConfig::new(path))
    }

    /// Create a store with custom configuration.
    pub fn with_config(config: XmlStoreConfig) -> Self {
        Self {
            config,
            loaded: false,
            data: SecurityData::default(),
            ids: IdSequence::new(),
        }
    }

    /// Get the document path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn ensure_loaded(&mut self) -> Result<()> {
        if !self.loaded {
            let (data, ids) = read_document(&self.config.path)?;
            self.data = data;
            self.ids = ids;
            self.loaded = true;
        }

        Ok(())
    }

    fn write(
        &self,
        users: &UserMap,
        roles: &RoleMap,
        permissions: &PermissionMap,
        secured_paths: &[String],
    ) -> Result<()> {
        let document =
            render_document(users, roles, permissions, secured_paths, self.config.indent)?;

        if self.config.create_parent_dirs
            && let Some(parent) = self.config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!(
                    "Failed to create storage directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.config.path)
            .map_err(|e| {
                Error::Storage(format!(
                    "Failed to create storage file {}: {}",
                    self.config.path.display(),
                    e
                ))
            })?;

        let mut writer = BufWriter::new(file);
        writer.write_all(&document)?;
        writer.flush()?;

        log::debug!("Security document written to {}", self.config.path.display());
        Ok(())
    }
}

impl SecurityStore for XmlStore {
    fn ping(&self) -> bool {
        !self.config.path.is_dir()
    }

    fn users(&mut self) -> Result<UserMap> {
        self.ensure_loaded()?;
        Ok(self.data.users.clone())
    }

    fn set_users(&mut self, users: Vec<User>) -> Result<UserMap> {
        self.ensure_loaded()?;

        let mut ids = self.ids.clone();
        let users = ids.assign_users(users)?;
        self.write(
            &users,
            &self.data.roles,
            &self.data.permissions,
            &self.data.secured_paths,
        )?;

        self.ids = ids;
        self.data.users = users.clone();
        Ok(users)
    }

    fn roles(&mut self) -> Result<RoleMap> {
        self.ensure_loaded()?;
        Ok(self.data.roles.clone())
    }

    fn set_roles(&mut self, roles: Vec<Role>) -> Result<RoleMap> {
        self.ensure_loaded()?;

        let mut ids = self.ids.clone();
        let roles = ids.assign_roles(roles)?;
        self.write(
            &self.data.users,
            &roles,
            &self.data.permissions,
            &self.data.secured_paths,
        )?;

        self.ids = ids;
        self.data.roles = roles.clone();
        crate::storage::relink_user_roles(&mut self.data.users, &self.data.roles);
        Ok(roles)
    }

    fn permissions(&mut self) -> Result<PermissionMap> {
        self.ensure_loaded()?;
        Ok(self.data.permissions.clone())
    }

    fn set_permissions(&mut self, permissions: PermissionMap) -> Result<()> {
        self.ensure_loaded()?;

        self.write(
            &self.data.users,
            &self.data.roles,
            &permissions,
            &self.data.secured_paths,
        )?;

        self.data.permissions = permissions;
        Ok(())
    }

    fn secured_paths(&mut self) -> Result<Vec<String>> {
        self.ensure_loaded()?;
        Ok(self.data.secured_paths.clone())
    }

    fn set_secured_paths(&mut self, paths: Vec<String>) -> Result<()> {
        self.ensure_loaded()?;

        self.write(
            &self.data.users,
            &self.data.roles,
            &self.data.permissions,
            &paths,
        )?;

        self.data.secured_paths = paths;
        Ok(())
    }
}

/// Minimal element tree of a parsed document.
#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: BTreeMap<String, String>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let name = decode(start.name().as_ref())?;

        let mut attributes = BTreeMap::new();
        for attribute in start.attributes() {
            let attribute = attribute?;
            let key = decode(attribute.key.as_ref())?;
            let value = attribute.unescape_value()?.into_owned();
            attributes.insert(key, value);
        }

        Ok(Self {
            name,
            attributes,
            ..Self::default()
        })
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.attribute(name).ok_or_else(|| {
            Error::MalformedDocument(format!("<{}> is missing the '{}' attribute", self.name, name))
        })
    }

    fn flag(&self, name: &str) -> bool {
        self.attribute(name).is_some_and(parse_flag)
    }

    fn text(&self) -> &str {
        self.text.trim()
    }
}

fn decode(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| Error::MalformedDocument(format!("invalid UTF-8: {e}")))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_id(value: &str, context: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::MalformedDocument(format!("invalid {context} id '{value}'")))
}

fn parse_tree(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(Element::from_start(&start)?),
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    Error::MalformedDocument("unexpected closing tag".to_string())
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                match stack.last_mut() {
                    Some(current) => current.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => {
                        return Err(Error::MalformedDocument(
                            "text outside of the root element".to_string(),
                        ));
                    }
                }
            }
            Event::CData(data) => {
                let text = decode(&data.into_inner())?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::MalformedDocument(format!(
            "unclosed element <{}>",
            open.name
        )));
    }

    root.ok_or_else(|| Error::MalformedDocument("missing root element".to_string()))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_some() {
        return Err(Error::MalformedDocument(
            "multiple root elements".to_string(),
        ));
    } else {
        *root = Some(element);
    }

    Ok(())
}

fn read_document(path: &Path) -> Result<(SecurityData, IdSequence)> {
    if !path.exists() {
        return Ok((SecurityData::default(), IdSequence::new()));
    }

    let xml = fs::read_to_string(path)?;
    let root = parse_tree(&xml)?;
    if root.name != TAG_ROOT {
        return Err(Error::MalformedDocument(format!(
            "expected <{}> root element, found <{}>",
            TAG_ROOT, root.name
        )));
    }

    let mut permissions = PermissionMap::new();
    let mut roles = Vec::new();
    let mut users = Vec::new();
    let mut secured_paths = Vec::new();

    for element in &root.children {
        match element.name.as_str() {
            TAG_USER => users.push(read_user(element)?),
            TAG_ROLE => roles.push(read_role(element)?),
            TAG_PERMISSION => {
                let permission = read_permission(element)?;
                permissions.insert(permission.code().to_string(), Arc::new(permission));
            }
            TAG_PATH => secured_paths.push(element.text().to_string()),
            _ => {}
        }
    }

    log::debug!(
        "Read {} users, {} roles and {} permissions from {}",
        users.len(),
        roles.len(),
        permissions.len(),
        path.display()
    );

    Ok(resolve(permissions, roles, users, secured_paths))
}

fn read_user(element: &Element) -> Result<UserRecord> {
    let id = parse_id(element.required(ATTRIBUTE_ID)?, TAG_USER)?;
    let username = element.attribute(ATTRIBUTE_USERNAME).unwrap_or_default();
    let password = element.attribute(ATTRIBUTE_PASSWORD).unwrap_or_default();

    let mut user = User::restore(username.to_string(), password.to_string());
    user.set_id(id)?;
    if let Some(name) = element.attribute(ATTRIBUTE_NAME) {
        user.set_display_name(name);
    }
    if let Some(email) = element.attribute(ATTRIBUTE_EMAIL) {
        user.set_email(Some(email.to_string()));
        user.set_email_confirmed(element.flag(ATTRIBUTE_CONFIRMED));
    }
    if let Some(image) = element.attribute(ATTRIBUTE_IMAGE) {
        user.set_image(Some(image.to_string()));
    }
    user.set_active(element.flag(ATTRIBUTE_ACTIVE));
    user.set_super_user(element.flag(ATTRIBUTE_SUPER));

    let mut role_ids = Vec::new();
    for child in &element.children {
        match child.name.as_str() {
            TAG_ROLE => role_ids.push(parse_id(child.text(), TAG_ROLE)?),
            TAG_PREFERENCE => {
                let key = child.required(ATTRIBUTE_KEY)?;
                let value: serde_json::Value = serde_json::from_str(child.text())?;
                user.set_preference(key, value);
            }
            _ => {}
        }
    }

    Ok(UserRecord { user, role_ids })
}

fn read_role(element: &Element) -> Result<RoleRecord> {
    let id = parse_id(element.required(ATTRIBUTE_ID)?, TAG_ROLE)?;
    let weight = match element.attribute(ATTRIBUTE_WEIGHT) {
        Some(weight) => weight.trim().parse().map_err(|_| {
            Error::MalformedDocument(format!("invalid weight '{weight}' for role {id}"))
        })?,
        None => 0,
    };

    let mut role = Role::named(element.attribute(ATTRIBUTE_NAME).unwrap_or_default());
    role.set_id(id)?;
    role.set_weight(weight);

    let mut paths = Vec::new();
    let mut permission_codes = Vec::new();
    for child in &element.children {
        match child.name.as_str() {
            TAG_PATH => paths.push(child.text().to_string()),
            TAG_PERMISSION => permission_codes.push(child.text().to_string()),
            _ => {}
        }
    }
    role.set_paths(paths);

    Ok(RoleRecord {
        role,
        permission_codes,
    })
}

fn read_permission(element: &Element) -> Result<Permission> {
    let code = element.required(ATTRIBUTE_CODE)?;
    let description = element.attribute(ATTRIBUTE_DESCRIPTION).unwrap_or_default();

    Ok(Permission::with_description(code, description))
}

fn render_document(
    users: &UserMap,
    roles: &RoleMap,
    permissions: &PermissionMap,
    secured_paths: &[String],
    indent: usize,
) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', indent);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new(TAG_ROOT)))?;

    for user in users.values() {
        write_user(&mut writer, user)?;
    }

    for role in roles.values() {
        write_role(&mut writer, role)?;
    }

    for permission in permissions.values() {
        let mut element = BytesStart::new(TAG_PERMISSION);
        element.push_attribute((ATTRIBUTE_CODE, permission.code()));
        element.push_attribute((ATTRIBUTE_DESCRIPTION, permission.description()));
        writer.write_event(Event::Empty(element))?;
    }

    for path in secured_paths {
        write_text_element(&mut writer, BytesStart::new(TAG_PATH), path)?;
    }

    writer.write_event(Event::End(BytesEnd::new(TAG_ROOT)))?;

    let mut document = writer.into_inner();
    document.push(b'\n');
    Ok(document)
}

fn write_user(writer: &mut Writer<Vec<u8>>, user: &User) -> Result<()> {
    let id = user.id().map(|id| id.to_string()).unwrap_or_default();

    let mut element = BytesStart::new(TAG_USER);
    element.push_attribute((ATTRIBUTE_ID, id.as_str()));
    if let Some(name) = user.raw_display_name() {
        element.push_attribute((ATTRIBUTE_NAME, name));
    }
    if let Some(email) = user.email() {
        element.push_attribute((ATTRIBUTE_EMAIL, email));
        element.push_attribute((ATTRIBUTE_CONFIRMED, flag(user.is_email_confirmed())));
    }
    element.push_attribute((ATTRIBUTE_USERNAME, user.username()));
    element.push_attribute((ATTRIBUTE_PASSWORD, user.password()));
    element.push_attribute((ATTRIBUTE_ACTIVE, flag(user.is_active())));
    element.push_attribute((ATTRIBUTE_SUPER, flag(user.is_super_user())));
    if let Some(image) = user.image() {
        element.push_attribute((ATTRIBUTE_IMAGE, image));
    }

    if user.roles().is_empty() && user.preferences().is_empty() {
        writer.write_event(Event::Empty(element))?;
        return Ok(());
    }

    writer.write_event(Event::Start(element))?;

    for role in user.roles() {
        if let Some(role_id) = role.id() {
            write_text_element(writer, BytesStart::new(TAG_ROLE), &role_id.to_string())?;
        }
    }

    for (key, value) in user.preferences() {
        let mut preference = BytesStart::new(TAG_PREFERENCE);
        preference.push_attribute((ATTRIBUTE_KEY, key.as_str()));
        write_text_element(writer, preference, &serde_json::to_string(value)?)?;
    }

    writer.write_event(Event::End(BytesEnd::new(TAG_USER)))?;
    Ok(())
}

fn write_role(writer: &mut Writer<Vec<u8>>, role: &Role) -> Result<()> {
    let id = role.id().map(|id| id.to_string()).unwrap_or_default();
    let weight = role.weight().to_string();

    let mut element = BytesStart::new(TAG_ROLE);
    element.push_attribute((ATTRIBUTE_ID, id.as_str()));
    element.push_attribute((ATTRIBUTE_NAME, role.name()));
    element.push_attribute((ATTRIBUTE_WEIGHT, weight.as_str()));

    if role.paths().is_empty() && role.permissions().is_empty() {
        writer.write_event(Event::Empty(element))?;
        return Ok(());
    }

    writer.write_event(Event::Start(element))?;

    for path in role.paths() {
        write_text_element(writer, BytesStart::new(TAG_PATH), path)?;
    }

    for permission in role.permissions() {
        write_text_element(writer, BytesStart::new(TAG_PERMISSION), permission.code())?;
    }

    writer.write_event(Event::End(BytesEnd::new(TAG_ROLE)))?;
    Ok(())
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    element: BytesStart<'_>,
    text: &str,
) -> Result<()> {
    let name = decode(element.name().as_ref())?;
    writer.write_event(Event::Start(element))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let mut store = XmlStore::new(dir.path().join("security.xml"));

        assert!(store.ping());
        assert!(store.users().unwrap().is_empty());
        assert!(store.roles().unwrap().is_empty());
        assert!(store.permissions().unwrap().is_empty());
        assert!(store.secured_paths().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_ping_fails_for_directory() {
        let dir = tempdir().unwrap();
        let store = XmlStore::new(dir.path());
        assert!(!store.ping());
    }

    #[test]
    fn test_parse_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("security.xml");
        fs::write(
            &path,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<security>
    <user id="3" username="alice" password="x" email="alice@example.com" confirmed="true" active="1" super="0">
        <role>7</role>
        <preference key="theme">"dark"</preference>
    </user>
    <role id="7" name="editor" weight="5">
        <path>/articles/**</path>
        <permission>article.edit</permission>
    </role>
    <permission code="article.edit" description="Edit &amp; publish"/>
    <path>/admin/**</path>
</security>
"#,
        )
        .unwrap();

        let mut store = XmlStore::new(&path);
        let users = store.users().unwrap();
        let alice = &users[&3];

        assert_eq!(alice.username(), "alice");
        assert_eq!(alice.display_name(), "alice");
        assert!(alice.is_email_confirmed());
        assert!(alice.is_active());
        assert!(!alice.is_super_user());
        assert!(!alice.is_password_changed());
        assert_eq!(alice.preference("theme"), Some(&json!("dark")));
        assert_eq!(alice.role_weight(), 5);
        assert!(alice.is_permission_granted("article.edit"));

        let permissions = store.permissions().unwrap();
        assert_eq!(permissions["article.edit"].description(), "Edit & publish");
        assert_eq!(store.secured_paths().unwrap(), vec!["/admin/**".to_string()]);
    }

    #[test]
    fn test_malformed_document_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("security.xml");

        for document in [
            "<security><user id=\"1\" username=\"a\"></security>",
            "<security>",
            "",
            "<other/>",
            "<security><user id=\"one\" username=\"a\"/></security>",
            "<security><role id=\"1\" weight=\"heavy\"/></security>",
        ] {
            fs::write(&path, document).unwrap();
            let mut store = XmlStore::new(&path);
            assert!(store.users().is_err(), "should reject: {document}");
        }
    }

    #[test]
    fn test_write_omits_empty_optional_attributes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("security.xml");
        let mut store = XmlStore::new(&path);

        let mut user = User::restore("bob".to_string(), "digest".to_string());
        user.set_active(true);
        store.set_users(vec![user]).unwrap();

        let document = fs::read_to_string(&path).unwrap();
        assert!(document.contains(r#"username="bob""#));
        assert!(document.contains(r#"active="1""#));
        assert!(document.contains(r#"super="0""#));
        assert!(!document.contains("email="));
        assert!(!document.contains("name=\"\""));
        assert!(!document.contains("image="));
        assert!(!document.contains("confirmed="));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let mut store = XmlStore::new(blocker.join("security.xml"));
        let result = store.set_secured_paths(vec!["/admin/**".to_string()]);

        assert!(result.is_err());
        assert!(store.secured_paths().unwrap().is_empty());
    }

    #[test]
    fn test_ids_continue_after_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("security.xml");

        let mut store = XmlStore::new(&path);
        let users = store
            .set_users(vec![
                User::with_credentials("a", "1"),
                User::with_credentials("b", "2"),
                User::with_credentials("c", "3"),
            ])
            .unwrap();
        assert_eq!(users.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);

        let mut store = XmlStore::new(&path);
        let mut users: Vec<User> = store.users().unwrap().into_values().collect();
        users.push(User::with_credentials("d", "4"));
        let users = store.set_users(users).unwrap();

        assert_eq!(users.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(users[&4].username(), "d");
    }
}
