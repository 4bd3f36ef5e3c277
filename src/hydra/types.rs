//! Serde types matching the Hydra API responses.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Resto
// ============================================================================

/// Menu of one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoMenu {
  pub date: NaiveDate,
  #[serde(default)]
  pub open: bool,
  /// Announcement shown instead of or above the menu (holidays, closures)
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(default)]
  pub meals: Vec<Meal>,
  #[serde(default)]
  pub vegetables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meal {
  /// "meat", "fish", "vegetarian", "vegan", "soup"
  #[serde(default)]
  pub kind: String,
  /// "main", "side" or "cold"
  #[serde(rename = "type", default)]
  pub meal_type: String,
  pub name: String,
  #[serde(default)]
  pub price: String,
}

impl RestoMenu {
  pub fn main_courses(&self) -> impl Iterator<Item = &Meal> {
    self
      .meals
      .iter()
      .filter(|m| m.meal_type == "main" && m.kind != "soup")
  }

  pub fn soups(&self) -> impl Iterator<Item = &Meal> {
    self.meals.iter().filter(|m| m.kind == "soup")
  }
}

// ============================================================================
// Schamper
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchamperArticle {
  pub title: String,
  pub link: String,
  pub pub_date: DateTime<Utc>,
  #[serde(default)]
  pub author: Option<String>,
  #[serde(default)]
  pub intro: Option<String>,
  #[serde(alias = "text", default)]
  pub body: String,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(default)]
  pub image: Option<String>,
}

// ============================================================================
// Associations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
  pub internal_name: String,
  pub display_name: String,
  #[serde(default)]
  pub full_name: Option<String>,
  #[serde(default)]
  pub parent_association: Option<String>,
}

impl Association {
  /// Full name when known, display name otherwise.
  pub fn name(&self) -> &str {
    self.full_name.as_deref().unwrap_or(&self.display_name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_menu_from_api() {
    let menu: RestoMenu = serde_json::from_str(
      r#"{
        "date": "2018-06-14",
        "open": true,
        "meals": [
          {"kind": "meat", "type": "main", "name": "Spaghetti bolognese", "price": "€ 3,20"},
          {"kind": "soup", "type": "main", "name": "Tomatensoep", "price": "€ 0,60"},
          {"kind": "vegetarian", "type": "cold", "name": "Salad bowl: Caesar", "price": ""}
        ],
        "vegetables": ["Wortelen"]
      }"#,
    )
    .unwrap();

    assert!(menu.open);
    assert_eq!(menu.message, None);
    let mains: Vec<_> = menu.main_courses().map(|m| m.name.as_str()).collect();
    assert_eq!(mains, vec!["Spaghetti bolognese"]);
    assert_eq!(menu.soups().count(), 1);
  }

  #[test]
  fn test_closed_menu_with_message() {
    let menu: RestoMenu = serde_json::from_str(
      r#"{"date": "2019-04-08", "open": false, "message": "Gesloten", "meals": [], "vegetables": []}"#,
    )
    .unwrap();
    assert!(!menu.open);
    assert_eq!(menu.message.as_deref(), Some("Gesloten"));
  }

  #[test]
  fn test_article_accepts_text_alias() {
    let article: SchamperArticle = serde_json::from_str(
      r#"{
        "title": "Nieuwe resto",
        "link": "https://schamper.ugent.be/a/1",
        "pub_date": "2024-05-01T10:00:00Z",
        "author": "Redactie",
        "text": "<p>Hallo</p>"
      }"#,
    )
    .unwrap();
    assert_eq!(article.body, "<p>Hallo</p>");
    assert_eq!(article.category, None);
  }

  #[test]
  fn test_association_name() {
    let vtk = Association {
      internal_name: "vtk".to_string(),
      display_name: "VTK".to_string(),
      full_name: Some("Vlaamse Technische Kring".to_string()),
      parent_association: Some("fkgent".to_string()),
    };
    assert_eq!(vtk.name(), "Vlaamse Technische Kring");

    let zeus = Association {
      full_name: None,
      display_name: "Zeus WPI".to_string(),
      ..vtk
    };
    assert_eq!(zeus.name(), "Zeus WPI");
  }
}
