use async_trait::async_trait;
use uuid::Uuid;

use super::{conflict, paginate, replace, MemoryStore, Tables};
use crate::models::{Organization, User};
use crate::store::{
    Listing, OrganizationFilter, OrganizationRepository, StoreResult, UserFilter, UserRepository,
};
use crate::utils::pagination::PageRequest;

fn check_user_unique(tables: &Tables, user: &User) -> StoreResult<()> {
    for other in tables.users.values().filter(|u| u.id != user.id) {
        if other.email == user.email {
            return Err(conflict("users_email_key"));
        }
        if user.phone_number.is_some() && other.phone_number == user.phone_number {
            return Err(conflict("users_phone_number_key"));
        }
    }
    Ok(())
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.tables.write();
        check_user_unique(&tables, user)?;
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .tables
            .read()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.tables.write();
        check_user_unique(&tables, user)?;
        replace(&mut tables.users, user.id, user, "user")
    }

    async fn list(&self, filter: &UserFilter, page: PageRequest) -> StoreResult<Listing<User>> {
        let tables = self.tables.read();
        let mut rows: Vec<User> = tables
            .users
            .values()
            .filter(|u| filter.include_inactive || u.is_active)
            .filter(|u| filter.role.map_or(true, |role| u.role == role))
            .filter(|u| {
                filter
                    .organization_id
                    .map_or(true, |org| u.organization_id == Some(org))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(paginate(rows, page))
    }
}

#[async_trait]
impl OrganizationRepository for MemoryStore {
    async fn insert(&self, organization: &Organization) -> StoreResult<()> {
        self.tables
            .write()
            .organizations
            .insert(organization.id, organization.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Organization>> {
        Ok(self.tables.read().organizations.get(&id).cloned())
    }

    async fn update(&self, organization: &Organization) -> StoreResult<()> {
        let mut tables = self.tables.write();
        replace(
            &mut tables.organizations,
            organization.id,
            organization,
            "organization",
        )
    }

    async fn list(
        &self,
        filter: &OrganizationFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<Organization>> {
        let tables = self.tables.read();
        let mut rows: Vec<Organization> = tables
            .organizations
            .values()
            .filter(|o| filter.include_inactive || o.is_active)
            .filter(|o| filter.region.map_or(true, |r| o.region == r))
            .filter(|o| filter.org_type.map_or(true, |t| o.org_type == t))
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .filter(|o| {
                filter
                    .city
                    .as_deref()
                    .map_or(true, |city| o.city.eq_ignore_ascii_case(city))
            })
            .filter(|o| filter.search.as_deref().map_or(true, |q| o.matches_search(q)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(paginate(rows, page))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::models::{User, UserRole};
    use crate::store::{Store, StoreError, UserFilter};
    use crate::utils::pagination::PageRequest;

    fn user(email: &str, phone: Option<&str>) -> User {
        let mut user = User::new(
            email.into(),
            "hash".into(),
            "Moussa".into(),
            "Fall".into(),
            UserRole::Customer,
            Utc::now(),
        );
        user.phone_number = phone.map(str::to_string);
        user
    }

    #[tokio::test]
    async fn test_email_and_phone_are_unique() {
        let store = Store::in_memory();
        store
            .users
            .insert(&user("a@example.sn", Some("+221770000001")))
            .await
            .unwrap();

        let err = store
            .users
            .insert(&user("a@example.sn", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(msg) if msg.contains("email")));

        let err = store
            .users
            .insert(&user("b@example.sn", Some("+221770000001")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(msg) if msg.contains("phone")));

        // Two accounts without a phone are fine.
        store.users.insert(&user("c@example.sn", None)).await.unwrap();
        store.users.insert(&user("d@example.sn", None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_hides_inactive_users() {
        let store = Store::in_memory();
        let mut gone = user("gone@example.sn", None);
        gone.is_active = false;
        store.users.insert(&gone).await.unwrap();
        store.users.insert(&user("here@example.sn", None)).await.unwrap();

        let listing = store
            .users
            .list(&UserFilter::default(), PageRequest::everything())
            .await
            .unwrap();
        assert_eq!(listing.total, 1);
        assert_eq!(listing.items[0].email, "here@example.sn");

        let filter = UserFilter {
            include_inactive: true,
            ..Default::default()
        };
        let listing = store
            .users
            .list(&filter, PageRequest::everything())
            .await
            .unwrap();
        assert_eq!(listing.total, 2);
    }
}
