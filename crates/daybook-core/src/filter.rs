use chrono::{
  Datelike,
  NaiveDate,
  Weekday
};
use tracing::trace;

use crate::datetime::{
  first_of_month,
  parse_day_expr,
  parse_period_expr,
  parse_weekday_name,
  time_to_seconds,
  week_start
};
use crate::entry::{
  Datebook,
  DayEntry
};

#[derive(Debug, Clone)]
pub enum Pred {
  DayOfMonth(u32),
  On(NaiveDate),
  Before(NaiveDate),
  After(NaiveDate),
  Month(NaiveDate),
  Author(String),
  WeekdayEq(Weekday),
  VirtualTagInclude(VirtualTag),
  VirtualTagExclude(VirtualTag),
  TextContains(String)
}

#[derive(Debug, Clone, Copy)]
pub enum VirtualTag {
  Vacation,
  Worked,
  Overtime,
  Paused,
  Today,
  Week,
  Weekend
}

#[derive(Debug, Clone)]
enum Expr {
  True,
  Pred(Pred),
  And(Vec<Expr>),
  Or(Vec<Expr>)
}

#[derive(Debug, Clone)]
pub struct Filter {
  expr: Expr
}

impl Default for Filter {
  fn default() -> Self {
    Self {
      expr: Expr::True
    }
  }
}

impl Filter {
  #[tracing::instrument(skip(
    terms, today
  ))]
  pub fn parse(
    terms: &[String],
    today: NaiveDate
  ) -> anyhow::Result<Self> {
    if terms.is_empty() {
      return Ok(Self::default());
    }

    let tokens = lex_terms(terms);
    let mut parser =
      Parser::new(tokens, today);
    let expr = parser.parse_expr()?;
    parser.ensure_end()?;

    Ok(Self {
      expr
    })
  }

  pub fn matches(
    &self,
    entry: &DayEntry,
    book: &Datebook,
    today: NaiveDate
  ) -> bool {
    eval_expr(
      &self.expr,
      entry,
      book,
      today
    )
  }
}

struct Parser {
  tokens: Vec<String>,
  pos:    usize,
  today:  NaiveDate
}

impl Parser {
  fn new(
    tokens: Vec<String>,
    today: NaiveDate
  ) -> Self {
    Self {
      tokens,
      pos: 0,
      today
    }
  }

  fn parse_expr(
    &mut self
  ) -> anyhow::Result<Expr> {
    self.parse_or()
  }

  fn parse_or(
    &mut self
  ) -> anyhow::Result<Expr> {
    let mut nodes =
      vec![self.parse_and()?];

    while self.match_any(&["or", "||"])
    {
      nodes.push(self.parse_and()?);
    }

    if nodes.len() == 1 {
      Ok(nodes.remove(0))
    } else {
      Ok(Expr::Or(nodes))
    }
  }

  fn parse_and(
    &mut self
  ) -> anyhow::Result<Expr> {
    let mut nodes =
      vec![self.parse_primary()?];

    loop {
      if self.match_any(&["and", "&&"])
      {
        nodes
          .push(self.parse_primary()?);
        continue;
      }

      if self
        .peek_is_implicit_and_boundary()
      {
        nodes
          .push(self.parse_primary()?);
        continue;
      }

      break;
    }

    if nodes.len() == 1 {
      Ok(nodes.remove(0))
    } else {
      Ok(Expr::And(nodes))
    }
  }

  fn parse_primary(
    &mut self
  ) -> anyhow::Result<Expr> {
    if self.match_token("(") {
      let inner = self.parse_expr()?;
      self.expect_token(")")?;
      return Ok(inner);
    }

    let token = self
      .next_token()
      .ok_or_else(|| {
        anyhow::anyhow!(
          "unexpected end of filter \
           expression"
        )
      })?;

    if token == ")" {
      return Err(anyhow::anyhow!(
        "unexpected ')' in filter \
         expression"
      ));
    }

    let pred =
      parse_atom(&token, self.today)?;
    Ok(Expr::Pred(pred))
  }

  fn ensure_end(
    &self
  ) -> anyhow::Result<()> {
    if self.pos < self.tokens.len() {
      Err(anyhow::anyhow!(
        "unexpected token in filter \
         expression: {}",
        self.tokens[self.pos]
      ))
    } else {
      Ok(())
    }
  }

  fn match_token(
    &mut self,
    expected: &str
  ) -> bool {
    let Some(tok) =
      self.tokens.get(self.pos)
    else {
      return false;
    };
    if tok
      .eq_ignore_ascii_case(expected)
    {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn match_any(
    &mut self,
    options: &[&str]
  ) -> bool {
    options
      .iter()
      .any(|opt| self.match_token(opt))
  }

  fn expect_token(
    &mut self,
    expected: &str
  ) -> anyhow::Result<()> {
    if self.match_token(expected) {
      Ok(())
    } else {
      Err(anyhow::anyhow!(
        "expected '{expected}' in \
         filter expression"
      ))
    }
  }

  fn next_token(
    &mut self
  ) -> Option<String> {
    let out = self
      .tokens
      .get(self.pos)
      .cloned();
    if out.is_some() {
      self.pos += 1;
    }
    out
  }

  fn peek_is_implicit_and_boundary(
    &self
  ) -> bool {
    let Some(tok) =
      self.tokens.get(self.pos)
    else {
      return false;
    };

    if tok.eq_ignore_ascii_case("and")
      || tok.eq_ignore_ascii_case("&&")
    {
      return false;
    }

    !tok.eq_ignore_ascii_case("or")
      && !tok.eq_ignore_ascii_case("||")
      && !tok.eq_ignore_ascii_case(")")
  }
}

fn lex_terms(
  terms: &[String]
) -> Vec<String> {
  let mut out = Vec::new();

  for term in terms {
    let mut current = String::new();
    for ch in term.chars() {
      if ch == '(' || ch == ')' {
        if !current.is_empty() {
          out.push(current.clone());
          current.clear();
        }
        out.push(ch.to_string());
      } else {
        current.push(ch);
      }
    }

    if !current.is_empty() {
      out.push(current);
    }
  }

  out
}

fn parse_atom(
  term: &str,
  today: NaiveDate
) -> anyhow::Result<Pred> {
  if let Some(tag) =
    term.strip_prefix('+')
  {
    let virtual_tag =
      parse_virtual_tag(tag)
        .ok_or_else(|| {
          anyhow::anyhow!(
            "unknown virtual tag: \
             +{tag}"
          )
        })?;
    return Ok(
      Pred::VirtualTagInclude(
        virtual_tag
      )
    );
  }
  if let Some(tag) =
    term.strip_prefix('-')
  {
    let virtual_tag =
      parse_virtual_tag(tag)
        .ok_or_else(|| {
          anyhow::anyhow!(
            "unknown virtual tag: \
             -{tag}"
          )
        })?;
    return Ok(
      Pred::VirtualTagExclude(
        virtual_tag
      )
    );
  }

  if term.len() <= 2
    && term
      .chars()
      .all(|c| c.is_ascii_digit())
    && let Ok(day) = term.parse::<u32>()
  {
    return Ok(Pred::DayOfMonth(day));
  }

  if let Some(author) =
    term.strip_prefix("author:")
  {
    return Ok(Pred::Author(
      author.to_string()
    ));
  }

  if let Some(value) =
    term.strip_prefix("month:")
  {
    return Ok(Pred::Month(
      parse_period_expr(value, today)?
    ));
  }

  if let Some(value) =
    term.strip_prefix("on:")
  {
    return Ok(Pred::On(
      parse_day_expr(value, today)?
    ));
  }

  if let Some(value) =
    term.strip_prefix("before:")
  {
    return Ok(Pred::Before(
      parse_day_expr(value, today)?
    ));
  }

  if let Some(value) =
    term.strip_prefix("after:")
  {
    return Ok(Pred::After(
      parse_day_expr(value, today)?
    ));
  }

  if let Some(value) =
    term.strip_prefix("weekday:")
  {
    let weekday =
      parse_weekday_name(value)
        .ok_or_else(|| {
          anyhow::anyhow!(
            "unknown weekday: {value}"
          )
        })?;
    return Ok(Pred::WeekdayEq(
      weekday
    ));
  }

  Ok(Pred::TextContains(
    term.to_string()
  ))
}

fn eval_expr(
  expr: &Expr,
  entry: &DayEntry,
  book: &Datebook,
  today: NaiveDate
) -> bool {
  match expr {
    | Expr::True => true,
    | Expr::Pred(pred) => {
      eval_pred(
        pred, entry, book, today
      )
    }
    | Expr::And(nodes) => {
      nodes.iter().all(|node| {
        eval_expr(
          node, entry, book, today
        )
      })
    }
    | Expr::Or(nodes) => {
      nodes.iter().any(|node| {
        eval_expr(
          node, entry, book, today
        )
      })
    }
  }
}

fn eval_pred(
  pred: &Pred,
  entry: &DayEntry,
  book: &Datebook,
  today: NaiveDate
) -> bool {
  let ok = match pred {
    | Pred::DayOfMonth(day) => {
      entry.activity_date.day() == *day
    }
    | Pred::On(date) => {
      entry.activity_date == *date
    }
    | Pred::Before(date) => {
      entry.activity_date < *date
    }
    | Pred::After(date) => {
      entry.activity_date > *date
    }
    | Pred::Month(period) => {
      first_of_month(
        entry.activity_date
      ) == *period
    }
    | Pred::Author(author) => {
      book.author == *author
    }
    | Pred::WeekdayEq(weekday) => {
      entry.activity_date.weekday()
        == *weekday
    }
    | Pred::VirtualTagInclude(
      virtual_tag
    ) => {
      eval_virtual_tag(
        *virtual_tag,
        entry,
        today
      )
    }
    | Pred::VirtualTagExclude(
      virtual_tag
    ) => {
      !eval_virtual_tag(
        *virtual_tag,
        entry,
        today
      )
    }
    | Pred::TextContains(text) => {
      entry
        .content
        .to_ascii_lowercase()
        .contains(
          &text.to_ascii_lowercase()
        )
    }
  };

  trace!(pred = ?pred, day = %entry.activity_date, ok, "filter predicate evaluation");
  ok
}

fn eval_virtual_tag(
  virtual_tag: VirtualTag,
  entry: &DayEntry,
  today: NaiveDate
) -> bool {
  match virtual_tag {
    | VirtualTag::Vacation => {
      entry.vacation
    }
    | VirtualTag::Worked => {
      entry.worked_seconds() > 0
    }
    | VirtualTag::Overtime => {
      entry.overtime_seconds() > 0
    }
    | VirtualTag::Paused => {
      time_to_seconds(entry.pause) > 0
    }
    | VirtualTag::Today => {
      entry.activity_date == today
    }
    | VirtualTag::Week => {
      week_start(entry.activity_date)
        == week_start(today)
    }
    | VirtualTag::Weekend => {
      entry
        .activity_date
        .weekday()
        .num_days_from_monday()
        >= 5
    }
  }
}

fn parse_virtual_tag(
  tag: &str
) -> Option<VirtualTag> {
  match tag {
    | "VACATION" => {
      Some(VirtualTag::Vacation)
    }
    | "WORKED" => {
      Some(VirtualTag::Worked)
    }
    | "OVERTIME" => {
      Some(VirtualTag::Overtime)
    }
    | "PAUSED" => {
      Some(VirtualTag::Paused)
    }
    | "TODAY" => {
      Some(VirtualTag::Today)
    }
    | "WEEK" => Some(VirtualTag::Week),
    | "WEEKEND" => {
      Some(VirtualTag::Weekend)
    }
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    NaiveTime
  };
  use uuid::Uuid;

  use super::Filter;
  use crate::entry::{
    Datebook,
    DayEntry
  };

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0)
      .expect("valid time")
  }

  fn book() -> Datebook {
    Datebook::new(
      "ann".to_string(),
      date(2026, 2, 1),
      date(2026, 2, 1)
        .and_time(time(8, 0))
    )
  }

  fn day(
    book: &Datebook,
    d: u32,
    content: &str
  ) -> DayEntry {
    let mut entry = DayEntry::new(
      book.uuid,
      date(2026, 2, d),
      time(9, 0),
      time(18, 0)
    );
    entry.content =
      content.to_string();
    entry
  }

  #[test]
  fn boolean_precedence_and_parentheses()
   {
    let today = date(2026, 2, 17);
    let book = book();
    let audits =
      day(&book, 3, "audits");
    let reviews =
      day(&book, 4, "reviews");
    let both = day(
      &book,
      5,
      "audits and reviews"
    );

    let filter = Filter::parse(
      &[
        "(".to_string(),
        "audits".to_string(),
        "or".to_string(),
        "reviews".to_string(),
        ")".to_string(),
        "and".to_string(),
        "reviews".to_string()
      ],
      today
    )
    .unwrap();

    assert!(
      !filter
        .matches(&audits, &book, today)
    );
    assert!(
      filter.matches(
        &reviews, &book, today
      )
    );
    assert!(
      filter
        .matches(&both, &book, today)
    );
  }

  #[test]
  fn virtual_tags_vacation_and_weekend()
   {
    let today = date(2026, 2, 17);
    let book = book();
    let mut rest =
      day(&book, 6, "off");
    rest.vacation = true;
    let saturday =
      day(&book, 7, "catchup");
    let weekday =
      day(&book, 9, "normal");

    let vacation_filter =
      Filter::parse(
        &["+VACATION".to_string()],
        today
      )
      .unwrap();
    let weekend_filter =
      Filter::parse(
        &["+WEEKEND".to_string()],
        today
      )
      .unwrap();
    let worked_filter =
      Filter::parse(
        &["+WORKED".to_string()],
        today
      )
      .unwrap();

    assert!(
      vacation_filter
        .matches(&rest, &book, today)
    );
    assert!(
      !vacation_filter.matches(
        &weekday, &book, today
      )
    );

    assert!(
      weekend_filter.matches(
        &saturday, &book, today
      )
    );
    assert!(
      !weekend_filter.matches(
        &weekday, &book, today
      )
    );

    assert!(
      !worked_filter
        .matches(&rest, &book, today)
    );
    assert!(
      worked_filter.matches(
        &weekday, &book, today
      )
    );
  }

  #[test]
  fn month_and_day_selectors() {
    let today = date(2026, 2, 17);
    let book = book();
    let early = day(&book, 3, "x");
    let late = day(&book, 24, "x");

    let month_filter = Filter::parse(
      &["month:2026-02".to_string()],
      today
    )
    .unwrap();
    assert!(
      month_filter
        .matches(&early, &book, today)
    );

    let day_filter = Filter::parse(
      &["3".to_string()],
      today
    )
    .unwrap();
    assert!(
      day_filter
        .matches(&early, &book, today)
    );
    assert!(
      !day_filter
        .matches(&late, &book, today)
    );

    let range_filter = Filter::parse(
      &[
        "after:10".to_string(),
        "before:28".to_string()
      ],
      today
    )
    .unwrap();
    assert!(
      range_filter
        .matches(&late, &book, today)
    );
    assert!(
      !range_filter
        .matches(&early, &book, today)
    );
  }
}
