//! Request bodies of the create/edit forms. Everything here runs before any
//! backend call: a form that fails validation never reaches the database or
//! the hosted services.

use crate::{
    error::{AppError, AppResult},
    queries::{
        announcements::{AnnouncementChanges, NewAnnouncement},
        clubs::{ClubChanges, NewClub},
        events::{EventChanges, NewEvent},
        profiles::ProfileChanges,
    },
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

pub const ANNOUNCEMENT_CATEGORIES: [&str; 6] =
    ["Academic", "Events", "Campus", "Club", "Sports", "Important"];

const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

fn required(value: &str, field: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        Err(AppError::bad_request(format!("{field} is required")))
    } else {
        Ok(value.to_string())
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Outer `None`: the field was left out. `Some(None)`: clear the column.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn clearable(value: Option<Option<String>>) -> Option<Option<String>> {
    value.map(optional)
}

/// Like [`required`], but only if the field was sent at all.
fn required_if_present(value: Option<String>, field: &str) -> AppResult<Option<String>> {
    value.map(|v| required(&v, field)).transpose()
}

fn parse_date(value: &str) -> AppResult<NaiveDate> {
    let value = required(value, "date")?;
    NaiveDate::parse_from_str(&value, "%Y-%m-%d")
        .map_err(|_| AppError::bad_request("date must look like 2024-09-30"))
}

fn parse_time(value: &str) -> AppResult<NaiveTime> {
    let value = required(value, "time")?;
    NaiveTime::parse_from_str(&value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&value, "%H:%M:%S"))
        .map_err(|_| AppError::bad_request("time must look like 18:30"))
}

fn check_capacity(capacity: Option<i32>) -> AppResult<i32> {
    match capacity {
        Some(c) if c >= 1 => Ok(c),
        Some(_) => Err(AppError::bad_request("capacity must be at least 1")),
        None => Err(AppError::bad_request("capacity is required")),
    }
}

fn check_category(category: &str) -> AppResult<String> {
    let category = required(category, "category")?;
    if ANNOUNCEMENT_CATEGORIES.contains(&category.as_str()) {
        Ok(category)
    } else {
        Err(AppError::bad_request("unknown announcement category"))
    }
}

fn nothing_to_update() -> AppError {
    AppError::bad_request("nothing to update")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUpload {
    #[serde(default)]
    pub file_name: String,
    pub data: String,
}

#[derive(Debug)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub extension: String,
}

impl ImageUpload {
    pub fn decode(&self) -> AppResult<DecodedImage> {
        let bytes = STANDARD
            .decode(self.data.trim())
            .map_err(|_| AppError::bad_request("image is not valid base64"))?;
        if bytes.is_empty() {
            return Err(AppError::bad_request("image is empty"));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(AppError::bad_request("image is larger than 5 MB"));
        }

        let kind = infer::get(&bytes)
            .filter(|k| k.matcher_type() == infer::MatcherType::Image)
            .ok_or_else(|| AppError::bad_request("only image files can be uploaded"))?;
        let content_type = kind
            .mime_type()
            .parse::<mime::Mime>()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|_| mime::APPLICATION_OCTET_STREAM.to_string());

        Ok(DecodedImage {
            bytes,
            content_type,
            extension: kind.extension().to_string(),
        })
    }
}

/// Storage path for a new object: `<prefix>/<user>/<millis>_<random>.<ext>`.
pub fn object_path(prefix: &str, user_id: Uuid, extension: &str) -> String {
    format!(
        "{prefix}/{user_id}/{}_{}.{extension}",
        chrono::Utc::now().timestamp_millis(),
        nanoid::nanoid!(10)
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub meeting_time: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub image: Option<ImageUpload>,
}

impl ClubForm {
    pub fn validate(&self) -> AppResult<()> {
        required(&self.name, "name")?;
        required(&self.description, "description")?;
        required(&self.category, "category")?;
        Ok(())
    }

    pub fn into_new_club(self, created_by: Uuid, image_url: Option<String>) -> AppResult<NewClub> {
        Ok(NewClub {
            name: required(&self.name, "name")?,
            description: required(&self.description, "description")?,
            category: required(&self.category, "category")?,
            meeting_time: optional(self.meeting_time),
            location: optional(self.location),
            email: optional(self.email),
            website: optional(self.website),
            image_url,
            created_by: Some(created_by),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubEditForm {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub meeting_time: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub location: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub website: Option<Option<String>>,
    pub image: Option<ImageUpload>,
}

impl ClubEditForm {
    /// Validated changes plus the image still to be uploaded. The caller fills
    /// in `image_url` once the upload went through.
    pub fn into_changes(self) -> AppResult<(ClubChanges, Option<ImageUpload>)> {
        let changes = ClubChanges {
            name: required_if_present(self.name, "name")?,
            description: required_if_present(self.description, "description")?,
            category: required_if_present(self.category, "category")?,
            meeting_time: clearable(self.meeting_time),
            location: clearable(self.location),
            email: clearable(self.email),
            website: clearable(self.website),
            image_url: None,
        };
        let empty = changes.name.is_none()
            && changes.description.is_none()
            && changes.category.is_none()
            && changes.meeting_time.is_none()
            && changes.location.is_none()
            && changes.email.is_none()
            && changes.website.is_none()
            && self.image.is_none();
        if empty {
            return Err(nothing_to_update());
        }
        Ok((changes, self.image))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    pub capacity: Option<i32>,
    pub club_id: Option<Uuid>,
    pub image: Option<ImageUpload>,
}

impl EventForm {
    pub fn validate(&self) -> AppResult<()> {
        required(&self.title, "title")?;
        required(&self.description, "description")?;
        parse_date(&self.date)?;
        parse_time(&self.time)?;
        required(&self.location, "location")?;
        check_capacity(self.capacity)?;
        Ok(())
    }

    pub fn into_new_event(self, created_by: Uuid, image_url: Option<String>) -> AppResult<NewEvent> {
        Ok(NewEvent {
            title: required(&self.title, "title")?,
            description: required(&self.description, "description")?,
            date: parse_date(&self.date)?,
            time: parse_time(&self.time)?,
            location: required(&self.location, "location")?,
            capacity: check_capacity(self.capacity)?,
            image_url,
            club_id: self.club_id,
            created_by: Some(created_by),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEditForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub capacity: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    pub club_id: Option<Option<Uuid>>,
    pub image: Option<ImageUpload>,
}

impl EventEditForm {
    pub fn into_changes(self) -> AppResult<(EventChanges, Option<ImageUpload>)> {
        let changes = EventChanges {
            title: required_if_present(self.title, "title")?,
            description: required_if_present(self.description, "description")?,
            date: self.date.as_deref().map(parse_date).transpose()?,
            time: self.time.as_deref().map(parse_time).transpose()?,
            location: required_if_present(self.location, "location")?,
            capacity: self
                .capacity
                .map(|c| check_capacity(Some(c)))
                .transpose()?,
            image_url: None,
            club_id: self.club_id,
        };
        let empty = changes.title.is_none()
            && changes.description.is_none()
            && changes.date.is_none()
            && changes.time.is_none()
            && changes.location.is_none()
            && changes.capacity.is_none()
            && changes.club_id.is_none()
            && self.image.is_none();
        if empty {
            return Err(nothing_to_update());
        }
        Ok((changes, self.image))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub category: String,
}

impl AnnouncementForm {
    pub fn into_new_announcement(self, created_by: Uuid) -> AppResult<NewAnnouncement> {
        if self.title.trim().is_empty() || self.message.trim().is_empty() || self.category.is_empty()
        {
            return Err(AppError::bad_request(
                "Please fill in all required fields (title, message, and category)",
            ));
        }
        Ok(NewAnnouncement {
            title: required(&self.title, "title")?,
            message: required(&self.message, "message")?,
            category: check_category(&self.category)?,
            created_by: Some(created_by),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementEditForm {
    pub title: Option<String>,
    pub message: Option<String>,
    pub category: Option<String>,
}

impl AnnouncementEditForm {
    pub fn into_changes(self) -> AppResult<AnnouncementChanges> {
        let changes = AnnouncementChanges {
            title: required_if_present(self.title, "title")?,
            message: required_if_present(self.message, "message")?,
            category: self.category.as_deref().map(check_category).transpose()?,
        };
        if changes.title.is_none() && changes.message.is_none() && changes.category.is_none() {
            return Err(nothing_to_update());
        }
        Ok(changes)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileForm {
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub bio: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub avatar_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub date_of_birth: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub phone: Option<Option<String>>,
}

impl ProfileForm {
    pub fn into_changes(self) -> AppResult<ProfileChanges> {
        let date_of_birth = clearable(self.date_of_birth)
            .map(|d| {
                d.map(|d| {
                    NaiveDate::parse_from_str(&d, "%Y-%m-%d").map_err(|_| {
                        AppError::bad_request("date of birth must look like 2004-05-17")
                    })
                })
                .transpose()
            })
            .transpose()?;
        let changes = ProfileChanges {
            full_name: required_if_present(self.full_name, "full name")?,
            bio: clearable(self.bio),
            avatar_url: clearable(self.avatar_url),
            date_of_birth,
            phone: clearable(self.phone),
        };
        let empty = changes.full_name.is_none()
            && changes.bio.is_none()
            && changes.avatar_url.is_none()
            && changes.date_of_birth.is_none()
            && changes.phone.is_none();
        if empty {
            return Err(nothing_to_update());
        }
        Ok(changes)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl SignInForm {
    pub fn validate(&self) -> AppResult<()> {
        check_email(&self.email)?;
        required(&self.password, "password")?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

impl SignUpForm {
    pub fn validate(&self) -> AppResult<()> {
        check_email(&self.email)?;
        required(&self.password, "password")?;
        required(&self.full_name, "full name")?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    #[serde(default)]
    pub email: String,
}

impl ResetPasswordForm {
    pub fn validate(&self) -> AppResult<()> {
        check_email(&self.email)
    }
}

fn check_email(email: &str) -> AppResult<()> {
    let email = required(email, "email")?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AppError::bad_request("email is not valid")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn event_form() -> EventForm {
        EventForm {
            title: "Hack Night".to_string(),
            description: "Bring a laptop".to_string(),
            date: "2024-10-04".to_string(),
            time: "18:30".to_string(),
            location: "Engineering 101".to_string(),
            capacity: Some(40),
            club_id: None,
            image: None,
        }
    }

    #[test]
    fn blank_required_fields_are_rejected() {
        let mut form = event_form();
        form.title = "   ".to_string();
        let err = form.validate().unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "title is required");

        let club: ClubForm = serde_json::from_value(serde_json::json!({
            "name": "Chess Club",
            "category": "Games"
        }))
        .unwrap();
        assert_eq!(club.validate().unwrap_err().message(), "description is required");

        let announcement = AnnouncementForm {
            title: "Exam schedule".to_string(),
            message: "".to_string(),
            category: "Academic".to_string(),
        };
        assert!(announcement
            .into_new_announcement(Uuid::new_v4())
            .unwrap_err()
            .message()
            .starts_with("Please fill in all required fields"));
    }

    #[test]
    fn event_fields_are_parsed_and_trimmed() {
        let mut form = event_form();
        form.location = "  Quad  ".to_string();
        let creator = Uuid::new_v4();
        let new = form.into_new_event(creator, None).unwrap();
        assert_eq!(new.location, "Quad");
        assert_eq!(new.date, NaiveDate::from_ymd_opt(2024, 10, 4).unwrap());
        assert_eq!(new.time, NaiveTime::from_hms_opt(18, 30, 0).unwrap());
        assert_eq!(new.created_by, Some(creator));
    }

    #[test]
    fn capacity_must_be_positive() {
        let mut form = event_form();
        form.capacity = Some(0);
        assert_eq!(form.validate().unwrap_err().message(), "capacity must be at least 1");
        form.capacity = None;
        assert_eq!(form.validate().unwrap_err().message(), "capacity is required");
    }

    #[test]
    fn announcement_categories_are_fixed() {
        let form = AnnouncementForm {
            title: "Game day".to_string(),
            message: "Wear red".to_string(),
            category: "Parties".to_string(),
        };
        assert_eq!(
            form.into_new_announcement(Uuid::new_v4()).unwrap_err().message(),
            "unknown announcement category"
        );
    }

    #[test]
    fn edits_need_at_least_one_change() {
        let edit: ClubEditForm = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(edit.into_changes().unwrap_err().message(), "nothing to update");

        let blank_name = AnnouncementEditForm {
            title: Some("".to_string()),
            message: None,
            category: None,
        };
        assert_eq!(blank_name.into_changes().unwrap_err().message(), "title is required");
    }

    #[test]
    fn blank_or_null_optional_fields_clear_the_column() {
        let edit: ClubEditForm = serde_json::from_value(serde_json::json!({
            "website": "",
            "meetingTime": null,
            "location": "  Room 4 "
        }))
        .unwrap();
        let (changes, image) = edit.into_changes().unwrap();
        assert_eq!(changes.website, Some(None));
        assert_eq!(changes.meeting_time, Some(None));
        assert_eq!(changes.location, Some(Some("Room 4".to_string())));
        assert_eq!(changes.email, None, "fields left out stay untouched");
        assert!(image.is_none());

        let detach: EventEditForm =
            serde_json::from_value(serde_json::json!({ "clubId": null })).unwrap();
        let (changes, _) = detach.into_changes().unwrap();
        assert_eq!(changes.club_id, Some(None));

        let untouched: EventEditForm =
            serde_json::from_value(serde_json::json!({ "title": "Renamed" })).unwrap();
        assert_eq!(untouched.into_changes().unwrap().0.club_id, None);

        let profile: ProfileForm = serde_json::from_value(serde_json::json!({
            "bio": " ",
            "phone": null,
            "dateOfBirth": "2004-05-17"
        }))
        .unwrap();
        let changes = profile.into_changes().unwrap();
        assert_eq!(changes.bio, Some(None));
        assert_eq!(changes.phone, Some(None));
        assert_eq!(changes.date_of_birth, Some(NaiveDate::from_ymd_opt(2004, 5, 17)));
        assert_eq!(changes.full_name, None);
    }

    #[test]
    fn images_are_sniffed_not_trusted() {
        let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        png.extend_from_slice(&[0; 16]);
        let upload = ImageUpload {
            file_name: "logo.txt".to_string(),
            data: STANDARD.encode(&png),
        };
        let image = upload.decode().unwrap();
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.extension, "png");

        let text = ImageUpload {
            file_name: "logo.png".to_string(),
            data: STANDARD.encode(b"definitely not an image"),
        };
        assert_eq!(
            text.decode().unwrap_err().message(),
            "only image files can be uploaded"
        );
    }

    #[test]
    fn object_paths_are_scoped_per_user() {
        let user = Uuid::new_v4();
        let path = object_path("clubs", user, "png");
        assert!(path.starts_with(&format!("clubs/{user}/")));
        assert!(path.ends_with(".png"));
    }

    #[test]
    fn sign_up_needs_a_name_and_an_email() {
        let form = SignUpForm {
            email: "not-an-email".to_string(),
            password: "hunter22".to_string(),
            full_name: "Ada".to_string(),
        };
        assert_eq!(form.validate().unwrap_err().message(), "email is not valid");

        let form = SignUpForm {
            email: "ada@campus.edu".to_string(),
            password: "hunter22".to_string(),
            full_name: " ".to_string(),
        };
        assert_eq!(form.validate().unwrap_err().message(), "full name is required");
    }
}
